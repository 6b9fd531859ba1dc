//! Per-frame GPU-visible storage and the frames-in-flight ring
//!
//! Each [`FrameResource`] owns one copy of every constant buffer and light list
//! the frame needs, laid out linearly in a single upload allocation. The CPU
//! writes exactly one frame resource per frame, round-robin, and only after the
//! GPU has finished the frame that last used it.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::config::RendererSettings;
use crate::render::api::{GpuAddress, GpuFence};
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::constants::{
    CascadeConstants, DirectionalLightConstants, LocalLightConstants, ObjectConstants,
    PassConstants, ShadowViewConstants,
};

/// Alignment of constant buffer views
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

/// Typed, index-addressed window into a frame's upload memory
///
/// Constant buffers pad every element to [`CONSTANT_BUFFER_ALIGNMENT`] so each
/// element can be bound on its own; structured lists are tightly packed.
#[derive(Debug)]
pub struct UploadBuffer<T: Pod> {
    name: &'static str,
    base: GpuAddress,
    offset: u64,
    stride: u64,
    capacity: usize,
    staging: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// Create a buffer of `capacity` elements at `offset` bytes past `base`
    pub fn new(
        name: &'static str,
        base: GpuAddress,
        offset: u64,
        capacity: usize,
        is_constant_buffer: bool,
    ) -> Self {
        let element = std::mem::size_of::<T>() as u64;
        let stride = if is_constant_buffer {
            align_up(element, CONSTANT_BUFFER_ALIGNMENT)
        } else {
            element
        };
        Self {
            name,
            base,
            offset,
            stride,
            capacity,
            staging: vec![0; (stride * capacity as u64) as usize],
            _marker: PhantomData,
        }
    }

    /// Copy one element into slot `index`
    pub fn copy_element(&mut self, index: usize, value: &T) -> RenderResult<()> {
        self.check_index(index)?;
        let start = index * self.stride as usize;
        let bytes = bytemuck::bytes_of(value);
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// GPU address of slot `index`
    pub fn gpu_address(&self, index: usize) -> RenderResult<GpuAddress> {
        self.check_index(index)?;
        Ok(self.base.offset(self.offset + index as u64 * self.stride))
    }

    /// GPU address of the first element
    pub fn base_address(&self) -> GpuAddress {
        self.base.offset(self.offset)
    }

    /// Staged value of slot `index`, for backends and diagnostics
    pub fn staged_element(&self, index: usize) -> Option<T> {
        if index >= self.capacity {
            return None;
        }
        let start = index * self.stride as usize;
        let size = std::mem::size_of::<T>();
        Some(bytemuck::pod_read_unaligned(&self.staging[start..start + size]))
    }

    /// Raw staged bytes
    pub fn bytes(&self) -> &[u8] {
        &self.staging
    }

    /// Element capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte distance between elements
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Total size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.staging.len() as u64
    }

    /// Semantic name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Description of the region for a backend uploader
    pub fn region(&self) -> BufferRegion {
        BufferRegion {
            name: self.name,
            offset: self.offset,
            size: self.size_bytes(),
        }
    }

    fn check_index(&self, index: usize) -> RenderResult<()> {
        if index >= self.capacity {
            return Err(RenderError::BufferIndexOutOfRange {
                buffer: self.name,
                index,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Location of one named region inside a frame's upload allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRegion {
    /// Semantic name
    pub name: &'static str,
    /// Byte offset from the frame's base address
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
}

struct RegionLayout {
    base: GpuAddress,
    cursor: u64,
}

impl RegionLayout {
    fn buffer<T: Pod>(
        &mut self,
        name: &'static str,
        capacity: usize,
        is_constant_buffer: bool,
    ) -> UploadBuffer<T> {
        let buffer = UploadBuffer::new(name, self.base, self.cursor, capacity, is_constant_buffer);
        self.cursor = align_up(self.cursor + buffer.size_bytes(), CONSTANT_BUFFER_ALIGNMENT);
        buffer
    }
}

/// All per-frame GPU-visible storage for one in-flight frame
#[derive(Debug)]
pub struct FrameResource {
    /// Camera constants
    pub pass: UploadBuffer<PassConstants>,
    /// Per-object constants indexed by object constant slot
    pub objects: UploadBuffer<ObjectConstants>,
    /// Sun constants
    pub directional_light: UploadBuffer<DirectionalLightConstants>,
    /// Local light array indexed by light slot
    pub local_lights: UploadBuffer<LocalLightConstants>,
    /// Light slots whose volume contains the camera
    pub containing_light_indices: UploadBuffer<u32>,
    /// Light slots inside the camera frustum
    pub inside_light_indices: UploadBuffer<u32>,
    /// Cascade shadow constants
    pub cascades: UploadBuffer<CascadeConstants>,
    /// Per shadow view constants, indexed by shadow atlas layer
    pub shadow_views: UploadBuffer<ShadowViewConstants>,
    base: GpuAddress,
    size: u64,
    fence_value: u64,
}

impl FrameResource {
    /// Lay out every region linearly from `base`
    pub fn new(base: GpuAddress, settings: &RendererSettings) -> Self {
        let cascade_count = settings.shadows.cascade_count;
        let lights = settings.max_local_lights;
        let mut layout = RegionLayout { base, cursor: 0 };

        let pass = layout.buffer("pass constants", 1, true);
        let objects = layout.buffer("object constants", settings.max_objects, true);
        let directional_light = layout.buffer("directional light constants", 1, true);
        let local_lights = layout.buffer("local light array", lights, true);
        let containing_light_indices = layout.buffer("containing light index list", lights, false);
        let inside_light_indices = layout.buffer("inside light index list", lights, false);
        let cascades = layout.buffer("cascade shadow constants", cascade_count, false);
        let shadow_views = layout.buffer("shadow view constants", cascade_count + lights, true);

        Self {
            pass,
            objects,
            directional_light,
            local_lights,
            containing_light_indices,
            inside_light_indices,
            cascades,
            shadow_views,
            base,
            size: layout.cursor,
            fence_value: 0,
        }
    }

    /// Every region, in layout order
    pub fn regions(&self) -> Vec<BufferRegion> {
        vec![
            self.pass.region(),
            self.objects.region(),
            self.directional_light.region(),
            self.local_lights.region(),
            self.containing_light_indices.region(),
            self.inside_light_indices.region(),
            self.cascades.region(),
            self.shadow_views.region(),
        ]
    }

    /// Base address of the frame's allocation
    pub fn base_address(&self) -> GpuAddress {
        self.base
    }

    /// Total bytes of the frame's allocation
    pub fn size_bytes(&self) -> u64 {
        self.size
    }

    /// Fence value the GPU signals once it is done with this frame
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }
}

/// Round-robin ring of frame resources
#[derive(Debug)]
pub struct FrameRing {
    frames: Vec<FrameResource>,
    current: usize,
    frame_number: u64,
    last_signalled: u64,
}

impl FrameRing {
    /// Create `settings.frames_in_flight` frames packed after `base`
    pub fn new(base: GpuAddress, settings: &RendererSettings) -> Self {
        let mut frames = Vec::with_capacity(settings.frames_in_flight);
        let mut address = base;
        for _ in 0..settings.frames_in_flight {
            let frame = FrameResource::new(address, settings);
            address = address.offset(frame.size_bytes());
            frames.push(frame);
        }
        log::info!(
            "Frame ring: {} frames, {} bytes each",
            frames.len(),
            frames.first().map_or(0, FrameResource::size_bytes)
        );
        Self {
            frames,
            current: 0,
            frame_number: 0,
            last_signalled: 0,
        }
    }

    /// Ring depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Index of the frame being recorded
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Frames begun so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The frame being recorded
    pub fn current(&self) -> &FrameResource {
        &self.frames[self.current]
    }

    /// The frame being recorded, mutably
    pub fn current_mut(&mut self) -> &mut FrameResource {
        &mut self.frames[self.current]
    }

    /// Every frame in ring order
    pub fn frames(&self) -> &[FrameResource] {
        &self.frames
    }

    /// Advance to the next slot, blocking until the GPU has released it
    pub fn begin_frame(&mut self, fence: &mut dyn GpuFence) -> RenderResult<usize> {
        self.current = (self.frame_number % self.frames.len() as u64) as usize;
        self.frame_number += 1;

        let pending = self.frames[self.current].fence_value;
        if pending != 0 && fence.completed_value()? < pending {
            log::trace!("Frame slot {} waiting for fence {}", self.current, pending);
            fence.wait_for_value(pending)?;
        }
        Ok(self.current)
    }

    /// Signal a fresh fence value for the frame just submitted
    pub fn end_frame(&mut self, fence: &mut dyn GpuFence) -> RenderResult<()> {
        self.last_signalled += 1;
        fence.signal(self.last_signalled)?;
        self.frames[self.current].fence_value = self.last_signalled;
        Ok(())
    }

    /// Wait until the GPU is idle with respect to every submitted frame
    pub fn flush(&mut self, fence: &mut dyn GpuFence) -> RenderResult<()> {
        if self.last_signalled != 0 {
            fence.wait_for_value(self.last_signalled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::HostFence;

    fn settings() -> RendererSettings {
        RendererSettings {
            max_objects: 4,
            max_local_lights: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_constant_elements_are_256_aligned() {
        let frame = FrameResource::new(GpuAddress(0x1000), &settings());
        assert_eq!(frame.objects.stride(), 256);
        for region in frame.regions() {
            assert_eq!(region.offset % CONSTANT_BUFFER_ALIGNMENT, 0, "{}", region.name);
        }
        let a = frame.objects.gpu_address(0).unwrap();
        let b = frame.objects.gpu_address(1).unwrap();
        assert_eq!(b.0 - a.0, 256);
        assert_eq!(frame.containing_light_indices.stride(), 4);
    }

    #[test]
    fn test_regions_do_not_overlap() {
        let frame = FrameResource::new(GpuAddress(0), &settings());
        let regions = frame.regions();
        for pair in regions.windows(2) {
            assert!(pair[0].offset + pair[0].size <= pair[1].offset);
        }
        let last = regions.last().unwrap();
        assert!(last.offset + last.size <= frame.size_bytes());
    }

    #[test]
    fn test_copy_element_out_of_range() {
        let mut frame = FrameResource::new(GpuAddress(0), &settings());
        frame.inside_light_indices.copy_element(1, &7).unwrap();
        assert_eq!(frame.inside_light_indices.staged_element(1), Some(7));
        assert_eq!(
            frame.inside_light_indices.copy_element(2, &7),
            Err(RenderError::BufferIndexOutOfRange {
                buffer: "inside light index list",
                index: 2,
                capacity: 2
            })
        );
    }

    #[test]
    fn test_ring_waits_only_when_gpu_is_behind() {
        let mut ring = FrameRing::new(GpuAddress(0), &settings());
        let mut fence = HostFence::new();

        // Fill all three slots without the GPU finishing anything
        for expected in 0..3 {
            assert_eq!(ring.begin_frame(&mut fence).unwrap(), expected);
            ring.end_frame(&mut fence).unwrap();
        }
        assert_eq!(fence.wait_count(), 0);

        // GPU finished frame 1: slot 0 is free
        fence.retire_up_to(1);
        assert_eq!(ring.begin_frame(&mut fence).unwrap(), 0);
        ring.end_frame(&mut fence).unwrap();
        assert_eq!(fence.wait_count(), 0);

        // Slot 1 still in use by fence value 2
        assert_eq!(ring.begin_frame(&mut fence).unwrap(), 1);
        assert_eq!(fence.wait_count(), 1);
        ring.end_frame(&mut fence).unwrap();

        ring.flush(&mut fence).unwrap();
        assert_eq!(fence.completed_value().unwrap(), fence.last_signalled());
    }

    #[test]
    fn test_frames_have_disjoint_addresses() {
        let ring = FrameRing::new(GpuAddress(0), &settings());
        let frames = ring.frames();
        assert_eq!(
            frames[1].base_address().0,
            frames[0].base_address().0 + frames[0].size_bytes()
        );
    }
}
