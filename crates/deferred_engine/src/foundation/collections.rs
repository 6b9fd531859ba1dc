//! Specialized collection types

use crate::render::error::{RenderError, RenderResult};

/// Handle into a [`SlotPool`]
///
/// Carries the slot index plus the generation the slot had when it was handed
/// out, so a handle kept after `free` is rejected instead of aliasing whatever
/// reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: u32,
    generation: u32,
}

impl SlotHandle {
    /// Slot index (dense, below the pool capacity)
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation counter for validation
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Fixed-capacity free list of slot indices with generation counters
///
/// Used for GPU-facing index spaces that must stay dense: descriptor views,
/// shadow atlas layers, rows of the light and object constant arrays.
#[derive(Debug, Clone)]
pub struct SlotPool {
    name: &'static str,
    generations: Vec<u32>,
    occupied: Vec<bool>,
    free: Vec<u32>,
}

impl SlotPool {
    /// Create a pool with `capacity` slots; the first allocation returns slot 0
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            generations: vec![0; capacity],
            occupied: vec![false; capacity],
            free: (0..capacity as u32).rev().collect(),
        }
    }

    /// Allocate a slot, failing once every slot is in use
    pub fn allocate(&mut self) -> RenderResult<SlotHandle> {
        let index = self.free.pop().ok_or(RenderError::PoolExhausted {
            pool: self.name,
            capacity: self.capacity(),
        })?;
        let slot = index as usize;
        self.occupied[slot] = true;
        log::trace!("{}: allocated slot {}", self.name, index);
        Ok(SlotHandle {
            index,
            generation: self.generations[slot],
        })
    }

    /// Return a slot to the pool; the handle (and all copies) become stale
    pub fn free(&mut self, handle: SlotHandle) -> RenderResult<()> {
        self.validate(handle)?;
        let slot = handle.index as usize;
        self.occupied[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(handle.index);
        log::trace!("{}: freed slot {}", self.name, handle.index);
        Ok(())
    }

    /// Whether the handle still names a live slot
    pub fn is_valid(&self, handle: SlotHandle) -> bool {
        let slot = handle.index as usize;
        slot < self.generations.len()
            && self.occupied[slot]
            && self.generations[slot] == handle.generation
    }

    /// Slot index of a live handle
    pub fn index(&self, handle: SlotHandle) -> RenderResult<u32> {
        self.validate(handle)?;
        Ok(handle.index)
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Number of slots in use
    pub fn len(&self) -> usize {
        self.capacity() - self.free.len()
    }

    /// Whether no slot is in use
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots still available
    pub fn available(&self) -> usize {
        self.free.len()
    }

    fn validate(&self, handle: SlotHandle) -> RenderResult<()> {
        if self.is_valid(handle) {
            Ok(())
        } else {
            Err(RenderError::StaleHandle {
                pool: self.name,
                index: handle.index,
                generation: handle.generation,
            })
        }
    }
}
