//! Collection scheduling policies.
//!
//! The collector consults its policy on every allocation; a policy sees a
//! cheap snapshot of the heap state and decides whether a young collection
//! should run first, and after each young collection whether to escalate to
//! a full one.

use std::time::Instant;

/// Snapshot of collector state handed to a [`GcPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct CollectInfo {
    /// Allocations since the last young collection (including this one).
    pub allocs_since_gc: usize,
    /// Objects in the young generation.
    pub young_count: usize,
    /// Objects in the old generation.
    pub old_count: usize,
    /// Payload bytes in the young generation.
    pub young_bytes: usize,
    /// Payload bytes in the old generation.
    pub old_bytes: usize,
    /// Young collections since process start.
    pub young_collections: usize,
    /// Full collections since process start.
    pub full_collections: usize,
}

/// Decides when the collector runs.
///
/// `want_young` is asked on every allocation; `want_full` is asked after
/// each young collection. Install a policy with [`set_policy`].
///
/// [`set_policy`]: crate::set_policy
pub trait GcPolicy {
    /// Should a young collection run before the next allocation?
    fn want_young(&mut self, info: &CollectInfo) -> bool;
    /// Should the young collection that just finished be followed by a full
    /// collection?
    fn want_full(&mut self, info: &CollectInfo) -> bool;
}

/// Count-based policy: young collection every `young_trigger` allocations,
/// full collection once the old generation outgrows `full_trigger` objects.
///
/// This is the default policy.
#[derive(Debug, Clone)]
pub struct CountPolicy {
    /// Allocations between young collections.
    pub young_trigger: usize,
    /// Old-generation object count that forces a full collection.
    pub full_trigger: usize,
}

impl Default for CountPolicy {
    fn default() -> Self {
        Self {
            young_trigger: 512,
            full_trigger: 10_240,
        }
    }
}

impl GcPolicy for CountPolicy {
    fn want_young(&mut self, info: &CollectInfo) -> bool {
        info.allocs_since_gc > self.young_trigger
    }

    fn want_full(&mut self, info: &CollectInfo) -> bool {
        info.old_count > self.full_trigger
    }
}

/// Time-based policy: young collection when both an allocation-pressure
/// floor and a wall-clock period have passed, full collection every
/// `young_per_full` young cycles.
#[derive(Debug, Clone)]
pub struct TimePolicy {
    /// Minimum wall time between young collections.
    pub period: std::time::Duration,
    /// Allocation floor below which the clock is not even consulted.
    pub min_allocs: usize,
    /// Young collections per full collection.
    pub young_per_full: usize,
    last_gc: Instant,
    young_since_full: usize,
}

impl TimePolicy {
    /// A time policy with the given period and the reference pressure
    /// thresholds.
    #[must_use]
    pub fn new(period: std::time::Duration) -> Self {
        Self {
            period,
            min_allocs: 10_240,
            young_per_full: 1024,
            last_gc: Instant::now(),
            young_since_full: 0,
        }
    }
}

impl Default for TimePolicy {
    fn default() -> Self {
        Self::new(std::time::Duration::from_millis(10))
    }
}

impl GcPolicy for TimePolicy {
    fn want_young(&mut self, info: &CollectInfo) -> bool {
        if info.allocs_since_gc < self.min_allocs {
            return false;
        }
        if self.last_gc.elapsed() < self.period {
            return false;
        }
        self.last_gc = Instant::now();
        self.young_since_full += 1;
        true
    }

    fn want_full(&mut self, _info: &CollectInfo) -> bool {
        if self.young_since_full > self.young_per_full {
            self.young_since_full = 0;
            return true;
        }
        false
    }
}

/// A policy that never triggers; collections run only when requested
/// explicitly. Useful in tests and latency-critical sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualPolicy;

impl GcPolicy for ManualPolicy {
    fn want_young(&mut self, _info: &CollectInfo) -> bool {
        false
    }

    fn want_full(&mut self, _info: &CollectInfo) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(allocs: usize, old_count: usize) -> CollectInfo {
        CollectInfo {
            allocs_since_gc: allocs,
            young_count: 0,
            old_count,
            young_bytes: 0,
            old_bytes: 0,
            young_collections: 0,
            full_collections: 0,
        }
    }

    #[test]
    fn count_policy_triggers_on_thresholds() {
        let mut p = CountPolicy::default();
        assert!(!p.want_young(&info(512, 0)));
        assert!(p.want_young(&info(513, 0)));
        assert!(!p.want_full(&info(0, 10_240)));
        assert!(p.want_full(&info(0, 10_241)));
    }

    #[test]
    fn time_policy_needs_pressure_and_elapsed_time() {
        let mut p = TimePolicy::new(std::time::Duration::ZERO);
        assert!(!p.want_young(&info(1, 0)));
        assert!(p.want_young(&info(20_000, 0)));
    }
}
