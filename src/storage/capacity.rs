//! Occupied-size bookkeeping for the backing directory.

#![allow(missing_docs)]

/// Current total size of committed items against the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityTracker {
    current: u64,
    max: u64,
}

impl CapacityTracker {
    #[must_use]
    pub const fn new(current: u64, max: u64) -> Self {
        Self { current, max }
    }

    /// Whether adding `extra` bytes would take the directory past its maximum.
    #[must_use]
    pub const fn would_exceed(&self, extra: u64) -> bool {
        self.current.saturating_add(extra) > self.max
    }

    /// Admission pre-check: upload sizes are unknown in advance, so new writers
    /// are turned away only once the directory is already at or over capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Account for a successfully ingested item.
    pub const fn commit(&mut self, bytes: u64) {
        self.current = self.current.saturating_add(bytes);
    }

    /// Account for an evicted item.
    pub const fn release(&mut self, bytes: u64) {
        self.current = self.current.saturating_sub(bytes);
    }

    #[must_use]
    pub const fn current(&self) -> u64 {
        self.current
    }

    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Occupied fraction of the maximum, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization_pct(&self) -> f64 {
        if self.max == 0 {
            return 100.0;
        }
        self.current as f64 / self.max as f64 * 100.0
    }
}
