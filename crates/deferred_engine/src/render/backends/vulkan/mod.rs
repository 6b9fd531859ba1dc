//! Vulkan backend built on `ash`
//!
//! Device, swapchain and pipeline creation belong to the host application.
//! This module only translates recorded commands and fence operations.

/// State, format and slot conversions
pub mod conversions;

/// Command recorder
pub mod command_recorder;

/// Timeline semaphore fence
pub mod timeline;

pub use command_recorder::{
    PushConstantBlock, VulkanCommandRecorder, VulkanPipeline, VulkanResourceTable, VulkanTexture,
};
pub use timeline::VulkanTimelineFence;
