//! Deferred renderer
//!
//! - [`api`]: seams to the backend and the surrounding application
//! - [`primitives`]: camera
//! - [`resources`]: G-buffer, shadow atlas and tracked texture states
//! - [`frame`]: per-frame constant storage, the frame ring, dirty tracking
//! - [`systems`]: lights, cascades, objects, culling and LOD
//! - [`passes`]: shadow, G-buffer, lighting and post passes
//! - [`renderer`]: the frame driver

pub mod api;
pub mod backends;
pub mod error;
pub mod frame;
pub mod passes;
pub mod primitives;
pub mod renderer;
pub mod resources;
pub mod systems;

pub use error::{RenderError, RenderResult};
pub use primitives::Camera;
pub use renderer::{DeferredRenderer, FrameStats, FrameVisibility, RenderContext};
