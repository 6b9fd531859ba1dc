//! `ash` implementation of the command recording seam
//!
//! Passes use dynamic rendering (Vulkan 1.3), so there are no render pass or
//! framebuffer objects. Constant buffers are reached through buffer device
//! addresses and textures through indices into one bindless descriptor set;
//! both travel in a single push constant block that is flushed before every
//! draw.

use std::collections::HashMap;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::render::api::{
    BufferHandle, CommandRecorder, ConstantSlot, GpuAddress, MeshBuffers, PassBeginInfo,
    PipelineKind, SubmeshRange, TextureBarrier, TextureHandle, Viewport,
};
use crate::render::backends::vulkan::conversions::{
    aspect_mask, constant_slot_index, image_state, CONSTANT_SLOT_COUNT,
};
use crate::render::error::{RenderError, RenderResult};
use crate::render::resources::TextureFormat;

/// Texture inputs addressable from one draw
pub const TEXTURE_SLOT_COUNT: usize = 8;

/// Push constant block shared by every pipeline layout
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstantBlock {
    /// Device addresses by constant slot
    pub addresses: [u64; CONSTANT_SLOT_COUNT],
    /// Bindless texture indices by shader input slot
    pub textures: [u32; TEXTURE_SLOT_COUNT],
}

/// A texture created by the backend
#[derive(Debug, Clone)]
pub struct VulkanTexture {
    /// Image
    pub image: vk::Image,
    /// View over every layer, used for sampling
    pub view: vk::ImageView,
    /// One single-layer view per array layer, used as attachments
    pub layer_views: Vec<vk::ImageView>,
    /// Texel format
    pub format: TextureFormat,
    /// Index in the bindless descriptor set
    pub descriptor_index: u32,
}

/// A graphics pipeline and its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanPipeline {
    /// Pipeline
    pub pipeline: vk::Pipeline,
    /// Layout with the bindless set at set 0 and [`PushConstantBlock`]
    pub layout: vk::PipelineLayout,
}

/// Vulkan objects behind the opaque handles the renderer uses
#[derive(Debug, Default)]
pub struct VulkanResourceTable {
    textures: HashMap<TextureHandle, VulkanTexture>,
    buffers: HashMap<BufferHandle, vk::Buffer>,
    pipelines: HashMap<PipelineKind, VulkanPipeline>,
    bindless_set: vk::DescriptorSet,
}

impl VulkanResourceTable {
    /// Empty table using `bindless_set` for every pipeline
    pub fn new(bindless_set: vk::DescriptorSet) -> Self {
        Self {
            bindless_set,
            ..Default::default()
        }
    }

    /// Register (or replace) a texture
    pub fn insert_texture(&mut self, handle: TextureHandle, texture: VulkanTexture) {
        self.textures.insert(handle, texture);
    }

    /// Forget a texture
    pub fn remove_texture(&mut self, handle: TextureHandle) -> Option<VulkanTexture> {
        self.textures.remove(&handle)
    }

    /// Register a buffer
    pub fn insert_buffer(&mut self, handle: BufferHandle, buffer: vk::Buffer) {
        self.buffers.insert(handle, buffer);
    }

    /// Register a pipeline
    pub fn insert_pipeline(&mut self, kind: PipelineKind, pipeline: VulkanPipeline) {
        self.pipelines.insert(kind, pipeline);
    }

    fn texture(&self, handle: TextureHandle) -> RenderResult<&VulkanTexture> {
        self.textures
            .get(&handle)
            .ok_or_else(|| RenderError::BackendError(format!("unknown texture {:?}", handle)))
    }

    fn buffer(&self, handle: BufferHandle) -> RenderResult<vk::Buffer> {
        self.buffers
            .get(&handle)
            .copied()
            .ok_or_else(|| RenderError::BackendError(format!("unknown buffer {:?}", handle)))
    }

    fn pipeline(&self, kind: PipelineKind) -> RenderResult<VulkanPipeline> {
        self.pipelines
            .get(&kind)
            .copied()
            .ok_or_else(|| RenderError::BackendError(format!("pipeline {:?} not created", kind)))
    }
}

/// Records one frame into a primary command buffer
///
/// The command buffer must be in the recording state for the lifetime of the
/// recorder.
pub struct VulkanCommandRecorder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    resources: &'a VulkanResourceTable,
    pipeline: Option<VulkanPipeline>,
    push: PushConstantBlock,
    push_dirty: bool,
    in_pass: bool,
}

impl<'a> VulkanCommandRecorder<'a> {
    /// Wrap a command buffer that is already recording
    pub fn new(
        device: &'a ash::Device,
        command_buffer: vk::CommandBuffer,
        resources: &'a VulkanResourceTable,
    ) -> Self {
        Self {
            device,
            command_buffer,
            resources,
            pipeline: None,
            push: PushConstantBlock::default(),
            push_dirty: false,
            in_pass: false,
        }
    }

    /// Command buffer being recorded
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn flush_push_constants(&mut self) -> RenderResult<()> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| RenderError::BackendError("draw without a bound pipeline".into()))?;
        if self.push_dirty {
            unsafe {
                self.device.cmd_push_constants(
                    self.command_buffer,
                    pipeline.layout,
                    vk::ShaderStageFlags::ALL_GRAPHICS,
                    0,
                    bytemuck::bytes_of(&self.push),
                );
            }
            self.push_dirty = false;
        }
        Ok(())
    }

    fn require_pass(&self, what: &str) -> RenderResult<()> {
        if !self.in_pass {
            return Err(RenderError::BackendError(format!("{what} recorded outside a pass")));
        }
        Ok(())
    }
}

impl CommandRecorder for VulkanCommandRecorder<'_> {
    fn texture_barrier(&mut self, barrier: &TextureBarrier) -> RenderResult<()> {
        let texture = self.resources.texture(barrier.texture)?;
        let is_depth = texture.format.is_depth();
        let before = image_state(barrier.before, is_depth);
        let after = image_state(barrier.after, is_depth);

        let image_barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(before.layout)
            .new_layout(after.layout)
            .src_access_mask(before.access)
            .dst_access_mask(after.access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(texture.format),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            })
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                before.stage,
                after.stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
        Ok(())
    }

    fn begin_pass(&mut self, info: &PassBeginInfo) -> RenderResult<()> {
        if self.in_pass {
            return Err(RenderError::BackendError(format!(
                "pass '{}' begun inside another pass",
                info.label
            )));
        }
        let load_op = if info.clear {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };

        let mut colors = Vec::with_capacity(info.color_targets.len());
        for handle in &info.color_targets {
            let texture = self.resources.texture(*handle)?;
            colors.push(
                vk::RenderingAttachmentInfo::builder()
                    .image_view(texture.view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: [0.0, 0.0, 0.0, 0.0],
                        },
                    })
                    .build(),
            );
        }

        let depth = match &info.depth {
            Some(attachment) => {
                let texture = self.resources.texture(attachment.texture)?;
                let view = match attachment.layer {
                    Some(layer) => *texture.layer_views.get(layer as usize).ok_or_else(|| {
                        RenderError::BackendError(format!(
                            "layer {} out of range for depth texture",
                            layer
                        ))
                    })?,
                    None => texture.view,
                };
                let layout = if attachment.writable {
                    vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
                };
                Some(
                    vk::RenderingAttachmentInfo::builder()
                        .image_view(view)
                        .image_layout(layout)
                        .load_op(load_op)
                        .store_op(if attachment.writable {
                            vk::AttachmentStoreOp::STORE
                        } else {
                            vk::AttachmentStoreOp::NONE
                        })
                        .clear_value(vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: 1.0,
                                stencil: 0,
                            },
                        })
                        .build(),
                )
            }
            None => None,
        };

        let mut rendering = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: info.width,
                    height: info.height,
                },
            })
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            rendering = rendering.depth_attachment(depth);
        }

        unsafe {
            self.device.cmd_begin_rendering(self.command_buffer, &rendering);
        }
        self.in_pass = true;
        Ok(())
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        self.require_pass("end_pass")?;
        unsafe {
            self.device.cmd_end_rendering(self.command_buffer);
        }
        self.in_pass = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> RenderResult<()> {
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: viewport.x as i32,
                y: viewport.y as i32,
            },
            extent: vk::Extent2D {
                width: viewport.width as u32,
                height: viewport.height as u32,
            },
        };
        unsafe {
            self.device
                .cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, kind: PipelineKind) -> RenderResult<()> {
        let pipeline = self.resources.pipeline(kind)?;
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[self.resources.bindless_set],
                &[],
            );
        }
        self.pipeline = Some(pipeline);
        // A new layout needs the whole block again
        self.push_dirty = true;
        Ok(())
    }

    fn bind_constants(&mut self, slot: ConstantSlot, address: GpuAddress) -> RenderResult<()> {
        self.push.addresses[constant_slot_index(slot)] = address.0;
        self.push_dirty = true;
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) -> RenderResult<()> {
        let index = self.resources.texture(texture)?.descriptor_index;
        let entry = self
            .push
            .textures
            .get_mut(slot as usize)
            .ok_or_else(|| RenderError::BackendError(format!("texture slot {} out of range", slot)))?;
        *entry = index;
        self.push_dirty = true;
        Ok(())
    }

    fn bind_mesh(&mut self, mesh: &MeshBuffers) -> RenderResult<()> {
        let vertex_buffer = self.resources.buffer(mesh.vertex_buffer)?;
        let index_buffer = self.resources.buffer(mesh.index_buffer)?;
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[vertex_buffer], &[0]);
            self.device.cmd_bind_index_buffer(
                self.command_buffer,
                index_buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
        Ok(())
    }

    fn draw_indexed(&mut self, range: &SubmeshRange) -> RenderResult<()> {
        self.require_pass("draw_indexed")?;
        self.flush_push_constants()?;
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                range.index_count,
                1,
                range.index_start,
                range.vertex_start as i32,
                0,
            );
        }
        Ok(())
    }

    fn draw_fullscreen(&mut self) -> RenderResult<()> {
        self.require_pass("draw_fullscreen")?;
        self.flush_push_constants()?;
        unsafe {
            self.device.cmd_draw(self.command_buffer, 3, 1, 0, 0);
        }
        Ok(())
    }
}
