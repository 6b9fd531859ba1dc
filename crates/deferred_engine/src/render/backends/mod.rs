//! Backend implementations of the recording and synchronization seams
//!
//! Only Vulkan is implemented. The headless recorder used by tests and the
//! viewer lives in [`crate::render::api`].

/// Vulkan backend
pub mod vulkan;
