use crate::config::SpillConfig;

/// Decides when the in-memory buffer must be spilled.
///
/// The bag keeps a running total of `weigh` over its buffered elements and asks
/// `should_spill` with that total before accepting each new element. An element
/// therefore lands in a fresh buffer exactly when the buffer already holds the
/// configured amount; the last full buffer is never spilled on its own.
pub trait ThresholdPolicy<T> {
    fn weigh(&self, _item: &T) -> usize {
        1
    }

    fn should_spill(&self, buffered_weight: usize) -> bool;
}

/// Spill once `capacity` elements are buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountThreshold {
    capacity: usize,
}

impl CountThreshold {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> ThresholdPolicy<T> for CountThreshold {
    fn should_spill(&self, buffered_weight: usize) -> bool {
        buffered_weight >= self.capacity
    }
}

/// Spill once the estimated byte size of the buffer reaches `limit_bytes`.
pub struct ByteThreshold<F> {
    limit_bytes: usize,
    sizer: F,
}

impl<F> ByteThreshold<F> {
    pub fn new(limit_bytes: usize, sizer: F) -> Self {
        Self {
            limit_bytes: limit_bytes.max(1),
            sizer,
        }
    }
}

impl<T, F> ThresholdPolicy<T> for ByteThreshold<F>
where
    F: Fn(&T) -> usize,
{
    fn weigh(&self, item: &T) -> usize {
        (self.sizer)(item)
    }

    fn should_spill(&self, buffered_weight: usize) -> bool {
        buffered_weight >= self.limit_bytes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverSpill;

impl<T> ThresholdPolicy<T> for NeverSpill {
    fn should_spill(&self, _buffered_weight: usize) -> bool {
        false
    }
}

/// Count policy when a threshold is configured, otherwise keep everything in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfiguredPolicy {
    Count(CountThreshold),
    Never,
}

impl ConfiguredPolicy {
    pub fn from_config(config: &SpillConfig) -> Self {
        match config.spill_threshold {
            Some(threshold) => ConfiguredPolicy::Count(CountThreshold::new(threshold)),
            None => ConfiguredPolicy::Never,
        }
    }
}

impl<T> ThresholdPolicy<T> for ConfiguredPolicy {
    fn should_spill(&self, buffered_weight: usize) -> bool {
        match self {
            ConfiguredPolicy::Count(count) => {
                <CountThreshold as ThresholdPolicy<T>>::should_spill(count, buffered_weight)
            }
            ConfiguredPolicy::Never => false,
        }
    }
}
