//! Backend-facing API
//!
//! The traits here are the seams between the renderer core and everything it
//! does not own: command recording, GPU synchronization and the geometry and
//! texture collaborators.

pub mod providers;
pub mod recorder;
pub mod sync;

pub use providers::{
    BufferHandle, GeometryProvider, MeshBuffers, ResourceRegistry, TextureHandle, TextureProvider,
};
pub use recorder::{
    CommandRecorder, ConstantSlot, DepthAttachment, GpuAddress, PassBeginInfo, PipelineKind,
    RecordedCommand, RecordingCommandList, SubmeshRange, TextureBarrier, Viewport,
};
pub use sync::{GpuFence, HostFence};
