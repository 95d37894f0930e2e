//! Pool statistics.
//!
//! [`PoolStats`] is a point-in-time snapshot of a
//! [`ServicePool`](crate::ServicePool), handy for progress logs.
//!
//! # Example
//!
//! ```rust,ignore
//! let stats = pool.stats();
//! log::info!("{} of {} services busy", stats.in_use(), stats.size);
//! ```

/// Snapshot of a service pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Fixed number of slots.
    pub size: usize,

    /// Slots waiting in the queue, with or without a started service.
    pub available: usize,

    /// Services created since the pool was built.
    pub created: usize,
}

impl PoolStats {
    /// Slots currently held by callers.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.available)
    }

    #[inline]
    pub fn has_available(&self) -> bool {
        self.available > 0
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
