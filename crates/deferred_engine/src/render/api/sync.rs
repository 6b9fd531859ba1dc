//! CPU/GPU synchronization
//!
//! Frames are paced with a single monotonically increasing fence value: every
//! frame signals a new value on submit and a frame slot may be rewritten once
//! the GPU has reported that value complete.

use crate::render::error::{RenderError, RenderResult};

/// Timeline fence shared by the CPU and the GPU queue
pub trait GpuFence {
    /// Highest value the GPU has completed
    fn completed_value(&self) -> RenderResult<u64>;

    /// Ask the GPU to signal `value` once all previously submitted work is done
    fn signal(&mut self, value: u64) -> RenderResult<()>;

    /// Block the CPU until the GPU has completed `value`
    fn wait_for_value(&mut self, value: u64) -> RenderResult<()>;
}

/// Host-side fence standing in for a GPU queue
///
/// Signalled values stay pending until [`HostFence::retire_up_to`] or a wait
/// retires them, which simulates a GPU running behind the CPU. Waiting on a
/// value that was never signalled is a deadlock and is reported as an error.
#[derive(Debug, Default)]
pub struct HostFence {
    completed: u64,
    last_signalled: u64,
    wait_count: usize,
}

impl HostFence {
    /// Create a fence with nothing signalled
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the GPU finishing all work up to `value`
    pub fn retire_up_to(&mut self, value: u64) {
        self.completed = self.completed.max(value.min(self.last_signalled));
    }

    /// Number of waits that actually had to block
    pub fn wait_count(&self) -> usize {
        self.wait_count
    }

    /// Highest signalled value
    pub fn last_signalled(&self) -> u64 {
        self.last_signalled
    }
}

impl GpuFence for HostFence {
    fn completed_value(&self) -> RenderResult<u64> {
        Ok(self.completed)
    }

    fn signal(&mut self, value: u64) -> RenderResult<()> {
        if value <= self.last_signalled {
            return Err(RenderError::BackendError(format!(
                "fence value {value} does not advance past {}",
                self.last_signalled
            )));
        }
        self.last_signalled = value;
        Ok(())
    }

    fn wait_for_value(&mut self, value: u64) -> RenderResult<()> {
        if self.completed >= value {
            return Ok(());
        }
        if value > self.last_signalled {
            return Err(RenderError::BackendError(format!(
                "waiting for fence value {value} that was never signalled"
            )));
        }
        self.wait_count += 1;
        self.completed = value;
        Ok(())
    }
}
