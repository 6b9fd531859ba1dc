//! GPU resources owned by the renderer
//!
//! Texture contents and memory live with the backend; this layer owns their
//! descriptions, handles and tracked states.

pub mod gbuffer;
pub mod shadow_atlas;
pub mod state;

pub use gbuffer::{GBuffer, GBufferTarget};
pub use shadow_atlas::{ShadowAtlas, ShadowLayer};
pub use state::{ResourceState, TrackedTexture};

/// Texel formats used by renderer-owned textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, sRGB encoded
    Rgba8Srgb,
    /// 8-bit RGBA, linear
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 16-bit float RG
    Rg16Float,
    /// 32-bit float depth
    Depth32Float,
}

impl TextureFormat {
    /// Whether the format is a depth format
    pub fn is_depth(self) -> bool {
        self == TextureFormat::Depth32Float
    }
}

/// Description of a texture the renderer asks the texture provider to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Texel format
    pub format: TextureFormat,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Array layers
    pub layers: u32,
}

impl TextureDesc {
    /// Single-layer 2D texture
    pub fn new_2d(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            layers: 1,
        }
    }

    /// Texture array with `layers` layers
    pub fn new_array(format: TextureFormat, width: u32, height: u32, layers: u32) -> Self {
        Self {
            format,
            width,
            height,
            layers,
        }
    }
}
