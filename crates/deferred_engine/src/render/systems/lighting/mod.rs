//! Lighting system
//!
//! Local and directional lights, cascaded shadow fitting and the per-frame
//! light visibility classification.

pub mod cascade;
pub mod light;
pub mod manager;

pub use cascade::{snap_to_texel_grid, Cascade, CascadeEngine};
pub use light::{cone_bound, DirectionalLight, LightDesc, LightType, LocalLight};
pub use manager::{classify_light, LightClass, LightKey, LightVisibility, LightingManager};
