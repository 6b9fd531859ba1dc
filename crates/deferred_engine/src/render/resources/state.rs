//! Tracked resource states and barrier emission
//!
//! Every shared texture (G-buffer targets, depth, the shadow atlas, post chain
//! targets) is wrapped in a [`TrackedTexture`]. Passes never remember what state
//! a texture is in; they ask for the state they need and the tracker emits a
//! barrier only when the tracked state differs. This is the only code that
//! mutates tracked state.

use crate::render::api::{CommandRecorder, TextureBarrier, TextureHandle};
use crate::render::error::RenderResult;

/// Pipeline-visible access mode of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents undefined, freshly created or discarded
    Undefined,
    /// Bound as a colour attachment
    RenderTarget,
    /// Bound as a writable depth attachment
    DepthWrite,
    /// Bound as a read-only depth attachment (depth test without writes)
    DepthRead,
    /// Sampled in a shader
    ShaderResource,
    /// Storage image access
    UnorderedAccess,
    /// Source of a copy
    CopySource,
    /// Destination of a copy
    CopyDest,
    /// Handed to the presentation engine
    Present,
}

impl ResourceState {
    /// Whether the state allows writes from the GPU
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::UnorderedAccess
                | ResourceState::CopyDest
        )
    }
}

/// A texture plus the state the GPU will find it in when recording reaches here
#[derive(Debug, Clone)]
pub struct TrackedTexture {
    label: &'static str,
    handle: TextureHandle,
    state: ResourceState,
}

impl TrackedTexture {
    /// Start tracking `handle` in `initial` state
    pub fn new(label: &'static str, handle: TextureHandle, initial: ResourceState) -> Self {
        Self {
            label,
            handle,
            state: initial,
        }
    }

    /// Texture handle
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    /// Debug label
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Currently tracked state
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Move the texture into `target`, recording one barrier if the state changes
    ///
    /// Returns whether a barrier was emitted.
    pub fn transition(
        &mut self,
        recorder: &mut dyn CommandRecorder,
        target: ResourceState,
    ) -> RenderResult<bool> {
        if self.state == target {
            return Ok(false);
        }
        recorder.texture_barrier(&TextureBarrier {
            texture: self.handle,
            before: self.state,
            after: target,
        })?;
        log::trace!(
            "{}: {:?} -> {:?}{}",
            self.label,
            self.state,
            target,
            if target.is_write() { " (write)" } else { "" }
        );
        self.state = target;
        Ok(true)
    }

    /// Replace the underlying texture (after a resize); contents start undefined
    pub fn replace(&mut self, handle: TextureHandle) {
        self.handle = handle;
        self.state = ResourceState::Undefined;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{RecordedCommand, RecordingCommandList};

    #[test]
    fn test_same_state_twice_emits_one_barrier() {
        let mut recorder = RecordingCommandList::new();
        let mut texture =
            TrackedTexture::new("normals", TextureHandle(7), ResourceState::Undefined);

        assert!(texture.transition(&mut recorder, ResourceState::RenderTarget).unwrap());
        assert!(!texture.transition(&mut recorder, ResourceState::RenderTarget).unwrap());

        assert_eq!(recorder.barriers().count(), 1);
        assert_eq!(texture.state(), ResourceState::RenderTarget);
    }

    #[test]
    fn test_barriers_follow_consumer_order() {
        let mut recorder = RecordingCommandList::new();
        let mut depth = TrackedTexture::new("depth", TextureHandle(1), ResourceState::Undefined);

        // Geometry writes, lighting reads, TAA reads again, next frame writes
        for target in [
            ResourceState::DepthWrite,
            ResourceState::ShaderResource,
            ResourceState::ShaderResource,
            ResourceState::DepthWrite,
        ] {
            depth.transition(&mut recorder, target).unwrap();
        }

        let transitions: Vec<_> = recorder
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Barrier(barrier) => Some((barrier.before, barrier.after)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (ResourceState::Undefined, ResourceState::DepthWrite),
                (ResourceState::DepthWrite, ResourceState::ShaderResource),
                (ResourceState::ShaderResource, ResourceState::DepthWrite),
            ]
        );
    }

    #[test]
    fn test_only_output_states_are_writes() {
        let writes: Vec<_> = [
            ResourceState::Undefined,
            ResourceState::RenderTarget,
            ResourceState::DepthWrite,
            ResourceState::DepthRead,
            ResourceState::ShaderResource,
            ResourceState::UnorderedAccess,
            ResourceState::CopySource,
            ResourceState::CopyDest,
            ResourceState::Present,
        ]
        .into_iter()
        .filter(|state| state.is_write())
        .collect();
        assert_eq!(
            writes,
            vec![
                ResourceState::RenderTarget,
                ResourceState::DepthWrite,
                ResourceState::UnorderedAccess,
                ResourceState::CopyDest,
            ]
        );
    }

    #[test]
    fn test_replace_resets_state() {
        let mut texture =
            TrackedTexture::new("base color", TextureHandle(3), ResourceState::ShaderResource);
        texture.replace(TextureHandle(9));
        assert_eq!(texture.handle(), TextureHandle(9));
        assert_eq!(texture.state(), ResourceState::Undefined);
    }
}
