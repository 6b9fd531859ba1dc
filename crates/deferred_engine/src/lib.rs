//! # Deferred Engine
//!
//! Deferred lighting, cascaded shadows and visibility culling for a Vulkan
//! scene editor.
//!
//! ## Features
//!
//! - **Cascaded Shadow Maps**: texel-snapped cascades for the sun, plus spot light shadows
//! - **Light Classification**: local lights split into camera-containing and in-frustum sets
//! - **Object Culling**: frustum tests in object space for the camera, cascades and spot lights
//! - **LOD Selection**: projected-size thresholds, or a pinned LOD for debugging
//! - **Frame Ring**: N-buffered constants paced by a timeline fence
//! - **Resource States**: barriers emitted only on real state changes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deferred_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ResourceRegistry::new();
//!     let settings = RendererSettings::default();
//!     let mut renderer = DeferredRenderer::new(settings, &mut registry, GpuAddress(0))?;
//!
//!     let mut camera = Camera::new();
//!     let mut recorder = RecordingCommandList::new();
//!     let mut fence = HostFence::new();
//!     let context = RenderContext { geometry: &registry, total_time: 0.0 };
//!     let stats = renderer.render_frame(&mut camera, &context, &mut recorder, &mut fence)?;
//!     println!("{} objects visible", stats.visible_objects);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{
            Config, ConfigError, LodSettings, PostProcessSettings, RendererSettings,
            ShadowSettings,
        },
        foundation::{
            bounds::{Aabb, BoundingSphere, Containment, Frustum},
            math::{Mat4, Mat4Ext, Quat, Transform, Vec2, Vec3},
        },
        render::{
            api::{
                CommandRecorder, GeometryProvider, GpuAddress, GpuFence, HostFence, MeshBuffers,
                RecordingCommandList, ResourceRegistry, SubmeshRange, TextureProvider,
            },
            Camera, DeferredRenderer, FrameStats, RenderContext, RenderError, RenderResult,
        },
        render::systems::lighting::{LightDesc, LightKey, LightType},
        render::systems::visibility::{LodLevel, LodMode, ObjectDesc, ObjectFlags, ObjectKey},
    };
}
