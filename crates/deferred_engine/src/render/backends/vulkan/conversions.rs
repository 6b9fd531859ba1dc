//! Mapping from backend-agnostic states and formats to Vulkan enums

use ash::vk;

use crate::render::api::ConstantSlot;
use crate::render::resources::{ResourceState, TextureFormat};

/// Layout, access mask and pipeline stage a texture has in one state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStateInfo {
    /// Image layout
    pub layout: vk::ImageLayout,
    /// Accesses performed in the state
    pub access: vk::AccessFlags,
    /// Stages performing those accesses
    pub stage: vk::PipelineStageFlags,
}

/// Vulkan description of `state` for a colour or depth texture
///
/// Sampled depth uses the read-only depth layout so the same image can stay
/// bound as a read-only attachment while it is sampled.
pub fn image_state(state: ResourceState, is_depth: bool) -> ImageStateInfo {
    let (layout, access, stage) = match state {
        ResourceState::Undefined => (
            vk::ImageLayout::UNDEFINED,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
        ResourceState::RenderTarget => (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ResourceState::DepthWrite => (
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ResourceState::DepthRead => (
            vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ResourceState::ShaderResource => (
            if is_depth {
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            },
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        ResourceState::UnorderedAccess => (
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        ResourceState::CopySource => (
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ResourceState::CopyDest => (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ResourceState::Present => (
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
    };
    ImageStateInfo {
        layout,
        access,
        stage,
    }
}

/// Vulkan format of a texture format
pub fn vk_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
    }
}

/// Image aspect touched by barriers and views of a texture format
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Number of device addresses in the push constant block
pub const CONSTANT_SLOT_COUNT: usize = 9;

/// Position of a constant slot in the push constant block
pub fn constant_slot_index(slot: ConstantSlot) -> usize {
    match slot {
        ConstantSlot::Pass => 0,
        ConstantSlot::Object => 1,
        ConstantSlot::DirectionalLight => 2,
        ConstantSlot::Cascades => 3,
        ConstantSlot::LocalLights => 4,
        ConstantSlot::LocalLightInstance => 5,
        ConstantSlot::ContainingLightIndices => 6,
        ConstantSlot::InsideLightIndices => 7,
        ConstantSlot::ShadowView => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_depth_uses_read_only_layout() {
        let depth = image_state(ResourceState::ShaderResource, true);
        let color = image_state(ResourceState::ShaderResource, false);
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
        assert_eq!(color.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(depth.access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_write_states_carry_write_access() {
        for state in [
            ResourceState::RenderTarget,
            ResourceState::DepthWrite,
            ResourceState::UnorderedAccess,
            ResourceState::CopyDest,
        ] {
            assert!(state.is_write());
            let access = image_state(state, false).access;
            assert!(
                access.intersects(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                        | vk::AccessFlags::SHADER_WRITE
                        | vk::AccessFlags::TRANSFER_WRITE
                ),
                "{:?}",
                state
            );
        }
    }

    #[test]
    fn test_formats_and_aspects() {
        assert_eq!(vk_format(TextureFormat::Depth32Float), vk::Format::D32_SFLOAT);
        assert_eq!(aspect_mask(TextureFormat::Depth32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_mask(TextureFormat::Rg16Float), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_constant_slots_are_distinct() {
        let slots = [
            ConstantSlot::Pass,
            ConstantSlot::Object,
            ConstantSlot::DirectionalLight,
            ConstantSlot::Cascades,
            ConstantSlot::LocalLights,
            ConstantSlot::LocalLightInstance,
            ConstantSlot::ContainingLightIndices,
            ConstantSlot::InsideLightIndices,
            ConstantSlot::ShadowView,
        ];
        let mut seen = [false; CONSTANT_SLOT_COUNT];
        for slot in slots {
            let index = constant_slot_index(slot);
            assert!(!seen[index]);
            seen[index] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
