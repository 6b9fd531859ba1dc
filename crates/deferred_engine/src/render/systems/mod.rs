//! Rendering systems
//!
//! CPU-side scene state and the per-frame decisions made from it: which lights
//! and objects are visible to which view, and at what level of detail.

pub mod lighting;
pub mod visibility;
