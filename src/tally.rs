use std::collections::BTreeMap;

use crate::phase::StatKey;
use crate::session::ClimbingStats;

/// A small non-negative counter that reports each change as a delta for an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyCounter {
    value: u64,
    step: u64,
}

impl Default for TallyCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TallyCounter {
    pub fn new(step: u64) -> Self {
        Self { value: 0, step }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Adds one step and returns the delta to apply to the aggregate.
    pub fn increment(&mut self) -> i64 {
        self.value += self.step;
        self.step as i64
    }

    /// Removes one step, clamping at zero. Returns `None` when already at zero,
    /// otherwise the distance actually moved (always negative).
    pub fn decrement(&mut self) -> Option<i64> {
        if self.value == 0 {
            return None;
        }
        let moved = self.step.min(self.value);
        self.value -= moved;
        Some(-(moved as i64))
    }

    /// Overwrites the displayed value with the aggregate's authoritative count.
    pub fn sync(&mut self, authoritative: u64) {
        self.value = authoritative;
    }
}

/// The attempts/sends/flashes counters for every climbing grade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyBoard {
    counters: BTreeMap<StatKey, TallyCounter>,
}

impl Default for TallyBoard {
    fn default() -> Self {
        Self {
            counters: StatKey::all().map(|k| (k, TallyCounter::new(1))).collect(),
        }
    }
}

impl TallyBoard {
    pub fn value(&self, key: StatKey) -> u64 {
        self.counters.get(&key).map_or(0, TallyCounter::value)
    }

    pub fn increment(&mut self, key: StatKey) -> i64 {
        self.counters.entry(key).or_default().increment()
    }

    pub fn decrement(&mut self, key: StatKey) -> Option<i64> {
        self.counters.get_mut(&key).and_then(TallyCounter::decrement)
    }

    /// Re-reads every counter from the session's stats; keys missing there read as zero.
    pub fn sync_from(&mut self, stats: &ClimbingStats) {
        for (key, counter) in self.counters.iter_mut() {
            counter.sync(stats.get(*key));
        }
    }
}
