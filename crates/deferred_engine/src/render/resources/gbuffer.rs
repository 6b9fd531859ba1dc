//! G-buffer render targets
//!
//! Layout:
//! - base color: RGBA8 sRGB
//! - normals: RGBA16F
//! - emissive: RGBA16F
//! - occlusion / roughness / metallic: RGBA8
//! - motion vectors: RG16F
//! - depth: D32F

use crate::render::api::{CommandRecorder, DepthAttachment, PassBeginInfo, TextureProvider};
use crate::render::error::RenderResult;
use crate::render::resources::{ResourceState, TextureDesc, TextureFormat, TrackedTexture};

/// Colour targets of the G-buffer, in shader output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferTarget {
    /// Albedo
    BaseColor,
    /// World-space normals
    Normals,
    /// Emitted radiance
    Emissive,
    /// Occlusion, roughness, metallic
    OcclusionRoughnessMetallic,
    /// Screen-space motion
    MotionVectors,
}

impl GBufferTarget {
    /// Every target in shader output order
    pub const ALL: [GBufferTarget; 5] = [
        GBufferTarget::BaseColor,
        GBufferTarget::Normals,
        GBufferTarget::Emissive,
        GBufferTarget::OcclusionRoughnessMetallic,
        GBufferTarget::MotionVectors,
    ];

    /// Texel format
    pub fn format(self) -> TextureFormat {
        match self {
            GBufferTarget::BaseColor => TextureFormat::Rgba8Srgb,
            GBufferTarget::Normals | GBufferTarget::Emissive => TextureFormat::Rgba16Float,
            GBufferTarget::OcclusionRoughnessMetallic => TextureFormat::Rgba8Unorm,
            GBufferTarget::MotionVectors => TextureFormat::Rg16Float,
        }
    }

    fn name(self) -> &'static str {
        match self {
            GBufferTarget::BaseColor => "gbuffer.base_color",
            GBufferTarget::Normals => "gbuffer.normals",
            GBufferTarget::Emissive => "gbuffer.emissive",
            GBufferTarget::OcclusionRoughnessMetallic => "gbuffer.orm",
            GBufferTarget::MotionVectors => "gbuffer.motion",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

const DEPTH_NAME: &str = "gbuffer.depth";

/// Geometry-pass targets plus depth, each with a tracked state
#[derive(Debug)]
pub struct GBuffer {
    width: u32,
    height: u32,
    targets: Vec<TrackedTexture>,
    depth: TrackedTexture,
}

impl GBuffer {
    /// Create every target at `width` x `height`
    pub fn new(textures: &mut dyn TextureProvider, width: u32, height: u32) -> Self {
        let targets = GBufferTarget::ALL
            .iter()
            .map(|target| {
                let handle = textures.create_texture(
                    target.name(),
                    TextureDesc::new_2d(target.format(), width, height),
                );
                TrackedTexture::new(target.name(), handle, ResourceState::Undefined)
            })
            .collect();
        let depth_handle = textures.create_texture(
            DEPTH_NAME,
            TextureDesc::new_2d(TextureFormat::Depth32Float, width, height),
        );
        Self {
            width,
            height,
            targets,
            depth: TrackedTexture::new(DEPTH_NAME, depth_handle, ResourceState::Undefined),
        }
    }

    /// Recreate every target at a new size; contents become undefined
    pub fn resize(&mut self, textures: &mut dyn TextureProvider, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        for (target, tracked) in GBufferTarget::ALL.iter().zip(&mut self.targets) {
            let handle = textures.create_texture(
                target.name(),
                TextureDesc::new_2d(target.format(), width, height),
            );
            tracked.replace(handle);
        }
        let depth_handle = textures.create_texture(
            DEPTH_NAME,
            TextureDesc::new_2d(TextureFormat::Depth32Float, width, height),
        );
        self.depth.replace(depth_handle);
        self.width = width;
        self.height = height;
        log::info!("G-buffer resized to {}x{}", width, height);
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// A colour target
    pub fn target(&self, target: GBufferTarget) -> &TrackedTexture {
        &self.targets[target.index()]
    }

    /// The depth target
    pub fn depth(&self) -> &TrackedTexture {
        &self.depth
    }

    /// Move one colour target into `state`
    pub fn transition_target(
        &mut self,
        recorder: &mut dyn CommandRecorder,
        target: GBufferTarget,
        state: ResourceState,
    ) -> RenderResult<bool> {
        self.targets[target.index()].transition(recorder, state)
    }

    /// Move the depth target into `state`
    pub fn transition_depth(
        &mut self,
        recorder: &mut dyn CommandRecorder,
        state: ResourceState,
    ) -> RenderResult<bool> {
        self.depth.transition(recorder, state)
    }

    /// Make every target writable and describe the geometry pass
    pub fn begin_geometry_pass(
        &mut self,
        recorder: &mut dyn CommandRecorder,
    ) -> RenderResult<PassBeginInfo> {
        for target in GBufferTarget::ALL {
            self.transition_target(recorder, target, ResourceState::RenderTarget)?;
        }
        self.transition_depth(recorder, ResourceState::DepthWrite)?;

        Ok(PassBeginInfo {
            label: "gbuffer",
            color_targets: self.targets.iter().map(TrackedTexture::handle).collect(),
            depth: Some(DepthAttachment {
                texture: self.depth.handle(),
                layer: None,
                writable: true,
            }),
            clear: true,
            width: self.width,
            height: self.height,
        })
    }

    /// Make every target and depth readable by the lighting shaders
    pub fn bind_for_lighting(&mut self, recorder: &mut dyn CommandRecorder) -> RenderResult<()> {
        for target in GBufferTarget::ALL {
            self.transition_target(recorder, target, ResourceState::ShaderResource)?;
        }
        self.transition_depth(recorder, ResourceState::ShaderResource)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{RecordingCommandList, ResourceRegistry};

    #[test]
    fn test_geometry_then_lighting_transitions() {
        let mut registry = ResourceRegistry::new();
        let mut gbuffer = GBuffer::new(&mut registry, 320, 240);
        let mut recorder = RecordingCommandList::new();

        let info = gbuffer.begin_geometry_pass(&mut recorder).unwrap();
        assert_eq!(info.color_targets.len(), 5);
        assert_eq!(recorder.barriers().count(), 6);

        gbuffer.bind_for_lighting(&mut recorder).unwrap();
        assert_eq!(recorder.barriers().count(), 12);

        // Already readable: second bind is free
        gbuffer.bind_for_lighting(&mut recorder).unwrap();
        assert_eq!(recorder.barriers().count(), 12);
        assert_eq!(gbuffer.depth().state(), ResourceState::ShaderResource);
    }

    #[test]
    fn test_resize_recreates_targets() {
        let mut registry = ResourceRegistry::new();
        let mut gbuffer = GBuffer::new(&mut registry, 320, 240);
        let old = gbuffer.target(GBufferTarget::Normals).handle();

        gbuffer.resize(&mut registry, 640, 480);
        let normals = gbuffer.target(GBufferTarget::Normals);
        assert_ne!(normals.handle(), old);
        assert_eq!(normals.state(), ResourceState::Undefined);
        assert_eq!(registry.texture_desc("gbuffer.normals").unwrap().width, 640);
        assert_eq!(
            registry.texture_desc("gbuffer.motion").unwrap().format,
            TextureFormat::Rg16Float
        );
    }
}
