//! Object visibility
//!
//! Render items, per-view culling and level-of-detail selection.

pub mod lod;
pub mod object;
pub mod object_manager;

pub use lod::{projected_size, LodMode, LodSelector};
pub use object::{LodLevel, ObjectDesc, ObjectFlags, RenderItem, Submesh};
pub use object_manager::{ObjectKey, ObjectManager, ObjectVisibility};
