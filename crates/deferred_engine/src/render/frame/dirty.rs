//! Write-through replication counter for N-buffered GPU data

/// Tracks how many frame resources still hold a stale copy of some CPU data
///
/// Each in-flight frame owns its own copy of every constant buffer. When the
/// CPU-side value changes, every copy is stale, so the count is reset to the
/// ring depth; each frame that writes its copy consumes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFrames {
    remaining: usize,
    depth: usize,
}

impl DirtyFrames {
    /// New counter, dirty for every frame of a ring with `depth` slots
    pub fn new(depth: usize) -> Self {
        Self {
            remaining: depth,
            depth,
        }
    }

    /// Mark every frame copy stale
    pub fn mark(&mut self) {
        self.remaining = self.depth;
    }

    /// Whether the current frame still has to write its copy
    pub fn is_dirty(&self) -> bool {
        self.remaining > 0
    }

    /// Record that one frame copy was written; returns whether a write was due
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Frame copies still stale
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicates_once_per_ring_slot() {
        let mut dirty = DirtyFrames::new(3);
        let writes = (0..5).filter(|_| dirty.consume()).count();
        assert_eq!(writes, 3);
        assert!(!dirty.is_dirty());

        dirty.consume();
        dirty.mark();
        assert_eq!(dirty.remaining(), 3);
    }

    #[test]
    fn test_mark_mid_cycle_restarts_count() {
        let mut dirty = DirtyFrames::new(2);
        dirty.consume();
        dirty.mark();
        assert!(dirty.consume());
        assert!(dirty.consume());
        assert!(!dirty.consume());
    }
}
