//! Rendering error types

use thiserror::Error;

/// High-level rendering error types
///
/// Capacity errors are fatal for the requested operation only: the add or
/// allocate call fails and nothing is written, so adjacent GPU-visible data is
/// never overwritten. Degenerate editing inputs (zero-length directions, an up
/// vector parallel to the view direction) are recovered where they happen and
/// never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Adding a local light would exceed the fixed light array
    #[error("Local light capacity exceeded: at most {max} lights are supported")]
    LightCapacityExceeded {
        /// Configured maximum
        max: usize,
    },

    /// Adding an object would exceed the per-frame object constant buffer
    #[error("Object capacity exceeded: at most {max} objects are supported")]
    ObjectCapacityExceeded {
        /// Configured maximum
        max: usize,
    },

    /// A fixed-size slot pool (descriptor views, shadow layers) ran dry
    #[error("{pool} exhausted: all {capacity} slots are in use")]
    PoolExhausted {
        /// Name of the pool
        pool: &'static str,
        /// Pool capacity
        capacity: usize,
    },

    /// A handle whose slot was freed (and possibly reused) was presented
    #[error("Stale handle for {pool}: slot {index} generation {generation}")]
    StaleHandle {
        /// Name of the pool
        pool: &'static str,
        /// Slot index carried by the handle
        index: u32,
        /// Generation carried by the handle
        generation: u32,
    },

    /// The light key does not name a live light
    #[error("Unknown light")]
    UnknownLight,

    /// The object key does not name a live object
    #[error("Unknown object")]
    UnknownObject,

    /// A visible object or light volume references unregistered geometry
    #[error("Geometry '{0}' is not registered")]
    MissingGeometry(String),

    /// An index-addressed write went past the end of a frame buffer
    #[error("Buffer '{buffer}' index {index} out of range (capacity {capacity})")]
    BufferIndexOutOfRange {
        /// Semantic buffer name
        buffer: &'static str,
        /// Requested element
        index: usize,
        /// Element capacity
        capacity: usize,
    },

    /// Settings rejected before any resource was created
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Backend-specific error occurred
    ///
    /// Wraps backend errors (Vulkan result codes, lost devices) in a generic form
    /// for consistent handling across backends.
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
