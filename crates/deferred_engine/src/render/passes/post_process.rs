//! Post-processing chain
//!
//! Effects run as fullscreen passes in a fixed order, each toggled by
//! settings: screen-space reflections, god rays, temporal anti-aliasing,
//! chromatic aberration, vignette. Every effect reads the previous result and
//! writes the next one, ping-ponging between two HDR targets. TAA writes into
//! one of two history textures and reads the other, swapping every frame it
//! runs.

use crate::config::PostProcessSettings;
use crate::render::api::{
    CommandRecorder, ConstantSlot, GpuAddress, PassBeginInfo, PipelineKind, TextureHandle,
    TextureProvider, Viewport,
};
use crate::render::error::RenderResult;
use crate::render::resources::{
    GBuffer, GBufferTarget, ResourceState, TextureDesc, TextureFormat, TrackedTexture,
};

const PING_NAMES: [&str; 2] = ["post.ping", "post.pong"];
const HISTORY_NAMES: [&str; 2] = ["taa.history0", "taa.history1"];

/// Where the current image lives while the chain runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// The lighting pass output
    Input,
    /// Ping-pong target by index
    Ping(usize),
    /// TAA history by index
    History(usize),
}

/// Ordered post effects and their intermediate targets
#[derive(Debug)]
pub struct PostProcessChain {
    ping: [TrackedTexture; 2],
    history: [TrackedTexture; 2],
    history_index: usize,
    history_valid: bool,
    width: u32,
    height: u32,
}

impl PostProcessChain {
    /// Create the intermediate targets at `width` x `height`
    pub fn new(textures: &mut dyn TextureProvider, width: u32, height: u32) -> Self {
        let mut create = |name: &'static str| {
            let handle = textures.create_texture(
                name,
                TextureDesc::new_2d(TextureFormat::Rgba16Float, width, height),
            );
            TrackedTexture::new(name, handle, ResourceState::Undefined)
        };
        Self {
            ping: [create(PING_NAMES[0]), create(PING_NAMES[1])],
            history: [create(HISTORY_NAMES[0]), create(HISTORY_NAMES[1])],
            history_index: 0,
            history_valid: false,
            width,
            height,
        }
    }

    /// Recreate every target; TAA history restarts
    pub fn resize(&mut self, textures: &mut dyn TextureProvider, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        for (names, targets) in [(PING_NAMES, &mut self.ping), (HISTORY_NAMES, &mut self.history)] {
            for (name, target) in names.iter().zip(targets.iter_mut()) {
                target.replace(textures.create_texture(
                    name,
                    TextureDesc::new_2d(TextureFormat::Rgba16Float, width, height),
                ));
            }
        }
        self.history_valid = false;
        self.width = width;
        self.height = height;
    }

    /// Index of the history texture TAA writes next
    pub fn history_index(&self) -> usize {
        self.history_index
    }

    /// Whether TAA has a previous frame to blend with
    pub fn has_history(&self) -> bool {
        self.history_valid
    }

    /// Run every enabled effect over `input`
    ///
    /// Returns the texture holding the final image, left readable. With every
    /// effect disabled that is `input` itself.
    pub fn record(
        &mut self,
        recorder: &mut dyn CommandRecorder,
        input: &mut TrackedTexture,
        gbuffer: &GBuffer,
        settings: &PostProcessSettings,
        pass_constants: GpuAddress,
    ) -> RenderResult<TextureHandle> {
        let effects = [
            (settings.ssr, PipelineKind::ScreenSpaceReflections, "ssr"),
            (settings.god_rays, PipelineKind::GodRays, "god_rays"),
            (settings.taa, PipelineKind::TemporalAntiAliasing, "taa"),
            (
                settings.chromatic_aberration,
                PipelineKind::ChromaticAberration,
                "chromatic_aberration",
            ),
            (settings.vignette, PipelineKind::Vignette, "vignette"),
        ];

        let mut source = Source::Input;
        let mut next_ping = 0;
        for (enabled, pipeline, label) in effects {
            if !enabled {
                continue;
            }
            let destination = if pipeline == PipelineKind::TemporalAntiAliasing {
                Source::History(self.history_index)
            } else {
                let index = next_ping;
                next_ping = 1 - next_ping;
                Source::Ping(index)
            };

            let source_handle = {
                let texture = self.texture_mut(source, input);
                texture.transition(recorder, ResourceState::ShaderResource)?;
                texture.handle()
            };
            let destination_handle = {
                let texture = self.texture_mut(destination, input);
                texture.transition(recorder, ResourceState::RenderTarget)?;
                texture.handle()
            };
            let previous_history = if pipeline == PipelineKind::TemporalAntiAliasing {
                let previous = &mut self.history[1 - self.history_index];
                previous.transition(recorder, ResourceState::ShaderResource)?;
                Some(previous.handle())
            } else {
                None
            };

            recorder.begin_pass(&PassBeginInfo {
                label,
                color_targets: vec![destination_handle],
                depth: None,
                clear: false,
                width: self.width,
                height: self.height,
            })?;
            recorder.set_viewport(Viewport::full(self.width, self.height))?;
            recorder.bind_pipeline(pipeline)?;
            recorder.bind_constants(ConstantSlot::Pass, pass_constants)?;
            recorder.bind_texture(0, source_handle)?;
            match pipeline {
                PipelineKind::ScreenSpaceReflections => {
                    recorder.bind_texture(1, gbuffer.target(GBufferTarget::Normals).handle())?;
                    recorder.bind_texture(
                        2,
                        gbuffer.target(GBufferTarget::OcclusionRoughnessMetallic).handle(),
                    )?;
                    recorder.bind_texture(3, gbuffer.depth().handle())?;
                }
                PipelineKind::GodRays => {
                    recorder.bind_texture(1, gbuffer.depth().handle())?;
                }
                PipelineKind::TemporalAntiAliasing => {
                    // First frame after a reset blends with the current image
                    let history = match (self.history_valid, previous_history) {
                        (true, Some(previous)) => previous,
                        _ => source_handle,
                    };
                    recorder.bind_texture(1, history)?;
                    recorder.bind_texture(
                        2,
                        gbuffer.target(GBufferTarget::MotionVectors).handle(),
                    )?;
                    recorder.bind_texture(3, gbuffer.depth().handle())?;
                }
                _ => {}
            }
            recorder.draw_fullscreen()?;
            recorder.end_pass()?;

            if pipeline == PipelineKind::TemporalAntiAliasing {
                self.history_index = 1 - self.history_index;
                self.history_valid = true;
            }
            source = destination;
        }

        let output = self.texture_mut(source, input);
        output.transition(recorder, ResourceState::ShaderResource)?;
        Ok(output.handle())
    }

    fn texture_mut<'a>(
        &'a mut self,
        source: Source,
        input: &'a mut TrackedTexture,
    ) -> &'a mut TrackedTexture {
        match source {
            Source::Input => input,
            Source::Ping(index) => &mut self.ping[index],
            Source::History(index) => &mut self.history[index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{RecordingCommandList, ResourceRegistry};

    fn setup() -> (ResourceRegistry, GBuffer, PostProcessChain, TrackedTexture) {
        let mut registry = ResourceRegistry::new();
        let gbuffer = GBuffer::new(&mut registry, 32, 32);
        let chain = PostProcessChain::new(&mut registry, 32, 32);
        let input = TrackedTexture::new("hdr", TextureHandle(999), ResourceState::RenderTarget);
        (registry, gbuffer, chain, input)
    }

    fn all_off() -> PostProcessSettings {
        PostProcessSettings {
            ssr: false,
            god_rays: false,
            chromatic_aberration: false,
            vignette: false,
            taa: false,
        }
    }

    #[test]
    fn test_disabled_chain_passes_input_through() {
        let (_, gbuffer, mut chain, mut input) = setup();
        let mut recorder = RecordingCommandList::new();
        let output = chain
            .record(&mut recorder, &mut input, &gbuffer, &all_off(), GpuAddress(0))
            .unwrap();

        assert_eq!(output, TextureHandle(999));
        assert!(recorder.pass_labels().is_empty());
        assert_eq!(input.state(), ResourceState::ShaderResource);
    }

    #[test]
    fn test_effects_run_in_order_and_ping_pong() {
        let (registry, gbuffer, mut chain, mut input) = setup();
        let settings = PostProcessSettings {
            ssr: true,
            god_rays: true,
            chromatic_aberration: false,
            vignette: true,
            taa: false,
        };
        let mut recorder = RecordingCommandList::new();
        let output = chain
            .record(&mut recorder, &mut input, &gbuffer, &settings, GpuAddress(0))
            .unwrap();

        assert_eq!(recorder.pass_labels(), vec!["ssr", "god_rays", "vignette"]);
        // ping, pong, ping
        assert_eq!(Some(output), registry.texture("post.ping"));
        assert_eq!(recorder.draw_count(), 3);
    }

    #[test]
    fn test_taa_history_swaps_every_frame() {
        let (registry, gbuffer, mut chain, mut input) = setup();
        let settings = PostProcessSettings {
            taa: true,
            ..all_off()
        };
        assert!(!chain.has_history());

        let mut recorder = RecordingCommandList::new();
        let first = chain
            .record(&mut recorder, &mut input, &gbuffer, &settings, GpuAddress(0))
            .unwrap();
        assert_eq!(Some(first), registry.texture("taa.history0"));
        assert!(chain.has_history());

        input.transition(&mut recorder, ResourceState::RenderTarget).unwrap();
        let second = chain
            .record(&mut recorder, &mut input, &gbuffer, &settings, GpuAddress(0))
            .unwrap();
        assert_eq!(Some(second), registry.texture("taa.history1"));
        assert_eq!(chain.history_index(), 0);
    }
}
