//! Shadow map texture array
//!
//! Layers `0..cascade_count` belong to the directional cascades for the whole
//! lifetime of the atlas. The remaining layers are handed out to local lights
//! on creation and returned on deletion.

use crate::config::ShadowSettings;
use crate::foundation::collections::{SlotHandle, SlotPool};
use crate::render::api::{CommandRecorder, TextureProvider};
use crate::render::error::RenderResult;
use crate::render::resources::{ResourceState, TextureDesc, TextureFormat, TrackedTexture};

/// Handle to a local light's shadow layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowLayer(SlotHandle);

impl ShadowLayer {
    pub(crate) fn from_handle(handle: SlotHandle) -> Self {
        Self(handle)
    }
}

/// Depth texture array shared by every shadow view
#[derive(Debug)]
pub struct ShadowAtlas {
    texture: TrackedTexture,
    cascade_count: u32,
    local_layers: SlotPool,
    resolution: u32,
    local_resolution: u32,
}

impl ShadowAtlas {
    /// Create the array with one layer per cascade plus `max_local_lights` layers
    pub fn new(
        textures: &mut dyn TextureProvider,
        settings: &ShadowSettings,
        max_local_lights: usize,
    ) -> Self {
        let cascade_count = settings.cascade_count as u32;
        let layers = cascade_count + max_local_lights as u32;
        let handle = textures.create_texture(
            "shadow_atlas",
            TextureDesc::new_array(
                TextureFormat::Depth32Float,
                settings.cascade_resolution,
                settings.cascade_resolution,
                layers,
            ),
        );
        log::info!(
            "Shadow atlas: {} layers at {}x{} ({} cascades)",
            layers,
            settings.cascade_resolution,
            settings.cascade_resolution,
            cascade_count
        );
        Self {
            texture: TrackedTexture::new("shadow atlas", handle, ResourceState::Undefined),
            cascade_count,
            local_layers: SlotPool::new("shadow atlas local layers", max_local_lights),
            resolution: settings.cascade_resolution,
            local_resolution: settings.local_resolution.min(settings.cascade_resolution),
        }
    }

    /// Reserve a layer for a local light
    pub fn allocate_local(&mut self) -> RenderResult<ShadowLayer> {
        self.local_layers.allocate().map(ShadowLayer)
    }

    /// Return a local light's layer
    pub fn free_local(&mut self, layer: ShadowLayer) -> RenderResult<()> {
        self.local_layers.free(layer.0)
    }

    /// Array layer of cascade `index`
    pub fn cascade_layer(&self, index: usize) -> u32 {
        index as u32
    }

    /// Array layer of a live local light handle
    pub fn local_layer(&self, layer: ShadowLayer) -> RenderResult<u32> {
        Ok(self.cascade_count + self.local_layers.index(layer.0)?)
    }

    /// Total array layers
    pub fn layer_count(&self) -> u32 {
        self.cascade_count + self.local_layers.capacity() as u32
    }

    /// Local layers still free
    pub fn available_local_layers(&self) -> usize {
        self.local_layers.available()
    }

    /// Cascade layer resolution
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Resolution used inside local light layers
    pub fn local_resolution(&self) -> u32 {
        self.local_resolution
    }

    /// Tracked texture
    pub fn texture(&self) -> &TrackedTexture {
        &self.texture
    }

    /// Make the atlas writable for the shadow pass
    pub fn begin_shadow_pass(&mut self, recorder: &mut dyn CommandRecorder) -> RenderResult<bool> {
        self.texture.transition(recorder, ResourceState::DepthWrite)
    }

    /// Make the atlas readable for lighting
    pub fn bind_for_lighting(&mut self, recorder: &mut dyn CommandRecorder) -> RenderResult<bool> {
        self.texture.transition(recorder, ResourceState::ShaderResource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::ResourceRegistry;
    use crate::render::error::RenderError;

    #[test]
    fn test_local_layers_follow_cascades() {
        let mut registry = ResourceRegistry::new();
        let mut atlas = ShadowAtlas::new(&mut registry, &ShadowSettings::default(), 2);
        assert_eq!(atlas.layer_count(), 5);
        assert_eq!(atlas.cascade_layer(2), 2);

        let a = atlas.allocate_local().unwrap();
        let b = atlas.allocate_local().unwrap();
        assert_eq!(atlas.local_layer(a).unwrap(), 3);
        assert_eq!(atlas.local_layer(b).unwrap(), 4);
        assert!(matches!(atlas.allocate_local(), Err(RenderError::PoolExhausted { .. })));

        atlas.free_local(a).unwrap();
        assert!(matches!(atlas.local_layer(a), Err(RenderError::StaleHandle { .. })));
        assert_eq!(atlas.available_local_layers(), 1);
    }

    #[test]
    fn test_atlas_registered_as_depth_array() {
        let mut registry = ResourceRegistry::new();
        let atlas = ShadowAtlas::new(&mut registry, &ShadowSettings::default(), 4);
        let desc = registry.texture_desc("shadow_atlas").unwrap();
        assert_eq!(desc.format, TextureFormat::Depth32Float);
        assert_eq!(desc.layers, 7);
        assert_eq!(registry.texture("shadow_atlas"), Some(atlas.texture().handle()));
    }
}
