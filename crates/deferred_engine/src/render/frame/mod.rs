//! Per-frame data: GPU constant layouts, the frame ring and dirty tracking

pub mod constants;
pub mod dirty;
pub mod frame_resource;

pub use constants::{
    CascadeConstants, DirectionalLightConstants, LocalLightConstants, ObjectConstants,
    PassConstants, ShadowViewConstants, TransformConstants,
};
pub use dirty::DirtyFrames;
pub use frame_resource::{BufferRegion, FrameResource, FrameRing, UploadBuffer};
