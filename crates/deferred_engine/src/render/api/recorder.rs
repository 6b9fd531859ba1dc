//! Command recording seam between the frame driver and a graphics backend
//!
//! Passes record through [`CommandRecorder`] only. The Vulkan backend
//! translates each call into `vkCmd*` calls; [`RecordingCommandList`] keeps the
//! calls as data so the frame can be inspected without a GPU.

use crate::render::api::providers::{MeshBuffers, TextureHandle};
use crate::render::error::{RenderError, RenderResult};
use crate::render::resources::ResourceState;

/// GPU virtual address of a constant buffer element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuAddress(pub u64);

impl GpuAddress {
    /// Address `bytes` further on
    pub fn offset(self, bytes: u64) -> Self {
        GpuAddress(self.0 + bytes)
    }
}

/// State transition of one texture (all layers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    /// Texture being transitioned
    pub texture: TextureHandle,
    /// State the texture is in
    pub before: ResourceState,
    /// State the texture moves to
    pub after: ResourceState,
}

/// Depth attachment of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthAttachment {
    /// Depth texture
    pub texture: TextureHandle,
    /// Array layer to render into, `None` for a single-layer texture
    pub layer: Option<u32>,
    /// Whether depth writes are enabled
    pub writable: bool,
}

/// Everything needed to begin a pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassBeginInfo {
    /// Debug label
    pub label: &'static str,
    /// Colour attachments in shader output order
    pub color_targets: Vec<TextureHandle>,
    /// Optional depth attachment
    pub depth: Option<DepthAttachment>,
    /// Clear attachments on load instead of preserving them
    pub clear: bool,
    /// Render area width
    pub width: u32,
    /// Render area height
    pub height: u32,
}

/// Viewport rectangle with a `[0, 1]` depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Viewport {
    /// Viewport covering a `width` x `height` target
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// Pipeline state objects the frame uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Depth-only shadow rendering
    ShadowDepth,
    /// Depth-only shadow rendering of tessellated objects
    ShadowDepthTessellated,
    /// G-buffer fill
    GBuffer,
    /// G-buffer fill with tessellation stages
    GBufferTessellated,
    /// Fullscreen directional light with cascades
    DirectionalLight,
    /// Fullscreen local light, used when the camera is inside the light volume
    LocalLightFullscreen,
    /// Local light rasterized as its bounding mesh
    LocalLightVolume,
    /// Screen-space reflections
    ScreenSpaceReflections,
    /// Radial light shafts
    GodRays,
    /// Chromatic aberration
    ChromaticAberration,
    /// Vignetting
    Vignette,
    /// Temporal anti-aliasing resolve
    TemporalAntiAliasing,
}

impl PipelineKind {
    /// Whether the pipeline includes tessellation stages
    pub fn is_tessellated(self) -> bool {
        matches!(
            self,
            PipelineKind::ShadowDepthTessellated | PipelineKind::GBufferTessellated
        )
    }
}

/// Shader binding slots for constant buffer addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantSlot {
    /// Per-pass camera constants
    Pass,
    /// Per-object constants
    Object,
    /// Directional light constants
    DirectionalLight,
    /// Cascade shadow constants array
    Cascades,
    /// Whole local light array
    LocalLights,
    /// One local light element for a volume draw
    LocalLightInstance,
    /// Index list of lights containing the camera
    ContainingLightIndices,
    /// Index list of lights inside the frustum
    InsideLightIndices,
    /// View-projection of the shadow view being rendered
    ShadowView,
}

/// Sub-range of a mesh drawn for one LOD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshRange {
    /// First vertex
    pub vertex_start: u32,
    /// Vertex count
    pub vertex_count: u32,
    /// First index
    pub index_start: u32,
    /// Index count
    pub index_count: u32,
}

/// Backend-agnostic command recording
///
/// One recorder records one frame on one thread; passes call it in frame order.
pub trait CommandRecorder {
    /// Record a texture state transition
    fn texture_barrier(&mut self, barrier: &TextureBarrier) -> RenderResult<()>;

    /// Begin rendering into attachments
    fn begin_pass(&mut self, info: &PassBeginInfo) -> RenderResult<()>;

    /// End the current pass
    fn end_pass(&mut self) -> RenderResult<()>;

    /// Set the viewport and matching scissor
    fn set_viewport(&mut self, viewport: Viewport) -> RenderResult<()>;

    /// Bind a pipeline
    fn bind_pipeline(&mut self, pipeline: PipelineKind) -> RenderResult<()>;

    /// Bind a constant buffer address to a slot
    fn bind_constants(&mut self, slot: ConstantSlot, address: GpuAddress) -> RenderResult<()>;

    /// Bind a sampled texture to a shader input slot
    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) -> RenderResult<()>;

    /// Bind vertex and index buffers
    fn bind_mesh(&mut self, mesh: &MeshBuffers) -> RenderResult<()>;

    /// Draw an indexed sub-range of the bound mesh
    fn draw_indexed(&mut self, range: &SubmeshRange) -> RenderResult<()>;

    /// Draw a fullscreen triangle
    fn draw_fullscreen(&mut self) -> RenderResult<()>;
}

/// A command captured by [`RecordingCommandList`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Texture barrier
    Barrier(TextureBarrier),
    /// Pass begin
    BeginPass(PassBeginInfo),
    /// Pass end
    EndPass,
    /// Viewport change
    Viewport(Viewport),
    /// Pipeline bind
    BindPipeline(PipelineKind),
    /// Constant address bind
    BindConstants(ConstantSlot, GpuAddress),
    /// Texture bind
    BindTexture(u32, TextureHandle),
    /// Mesh bind
    BindMesh(MeshBuffers),
    /// Indexed draw
    DrawIndexed(SubmeshRange),
    /// Fullscreen draw
    DrawFullscreen,
}

/// Headless recorder that stores commands and validates pass nesting
#[derive(Debug, Default)]
pub struct RecordingCommandList {
    commands: Vec<RecordedCommand>,
    open_pass: Option<&'static str>,
}

impl RecordingCommandList {
    /// Create an empty command list
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded command in order
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Recorded barriers in order
    pub fn barriers(&self) -> impl Iterator<Item = &TextureBarrier> {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::Barrier(barrier) => Some(barrier),
            _ => None,
        })
    }

    /// Labels of begun passes in order
    pub fn pass_labels(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BeginPass(info) => Some(info.label),
                _ => None,
            })
            .collect()
    }

    /// Number of draws (indexed and fullscreen) recorded inside passes labelled `label`
    pub fn draws_in_pass(&self, label: &str) -> usize {
        let mut inside = false;
        let mut count = 0;
        for command in &self.commands {
            match command {
                RecordedCommand::BeginPass(info) => inside = info.label == label,
                RecordedCommand::EndPass => inside = false,
                RecordedCommand::DrawIndexed(_) | RecordedCommand::DrawFullscreen if inside => {
                    count += 1;
                }
                _ => {}
            }
        }
        count
    }

    /// Total number of draws
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    RecordedCommand::DrawIndexed(_) | RecordedCommand::DrawFullscreen
                )
            })
            .count()
    }

    /// Drop all recorded commands
    pub fn reset(&mut self) {
        self.commands.clear();
        self.open_pass = None;
    }

    fn require_pass(&self, what: &str) -> RenderResult<()> {
        if self.open_pass.is_none() {
            return Err(RenderError::BackendError(format!("{what} recorded outside a pass")));
        }
        Ok(())
    }
}

impl CommandRecorder for RecordingCommandList {
    fn texture_barrier(&mut self, barrier: &TextureBarrier) -> RenderResult<()> {
        if let Some(label) = self.open_pass {
            return Err(RenderError::BackendError(format!(
                "barrier recorded inside pass '{label}'"
            )));
        }
        self.commands.push(RecordedCommand::Barrier(*barrier));
        Ok(())
    }

    fn begin_pass(&mut self, info: &PassBeginInfo) -> RenderResult<()> {
        if let Some(label) = self.open_pass {
            return Err(RenderError::BackendError(format!(
                "pass '{}' begun while '{label}' is open",
                info.label
            )));
        }
        self.open_pass = Some(info.label);
        self.commands.push(RecordedCommand::BeginPass(info.clone()));
        Ok(())
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        if self.open_pass.take().is_none() {
            return Err(RenderError::BackendError("end_pass without an open pass".into()));
        }
        self.commands.push(RecordedCommand::EndPass);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> RenderResult<()> {
        self.commands.push(RecordedCommand::Viewport(viewport));
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineKind) -> RenderResult<()> {
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
        Ok(())
    }

    fn bind_constants(&mut self, slot: ConstantSlot, address: GpuAddress) -> RenderResult<()> {
        self.commands.push(RecordedCommand::BindConstants(slot, address));
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) -> RenderResult<()> {
        self.commands.push(RecordedCommand::BindTexture(slot, texture));
        Ok(())
    }

    fn bind_mesh(&mut self, mesh: &MeshBuffers) -> RenderResult<()> {
        self.commands.push(RecordedCommand::BindMesh(*mesh));
        Ok(())
    }

    fn draw_indexed(&mut self, range: &SubmeshRange) -> RenderResult<()> {
        self.require_pass("draw_indexed")?;
        self.commands.push(RecordedCommand::DrawIndexed(*range));
        Ok(())
    }

    fn draw_fullscreen(&mut self) -> RenderResult<()> {
        self.require_pass("draw_fullscreen")?;
        self.commands.push(RecordedCommand::DrawFullscreen);
        Ok(())
    }
}
