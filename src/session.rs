use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fields::{self, FieldTarget, InputError};
use crate::phase::{EdgeSize, Phase, StatKey, TERMINAL_PHASE};

pub const HANGBOARD_SET_COUNT: usize = 6;
pub const WEIGHTED_PULL_SET_COUNT: usize = 4;
pub const POWER_ENDURANCE_SET_COUNT: usize = 3;
pub const DEFAULT_HANG_SECS: f64 = 8.0;

/// Seconds spent in each tracked phase; zero until the phase completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Durations {
    pub stretching: u64,
    pub hangboard: u64,
    pub climbing: u64,
    pub power_endurance: u64,
    pub rehab: u64,
}

impl Durations {
    pub fn get(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Stretching => self.stretching,
            Phase::Hangboard => self.hangboard,
            Phase::Climbing => self.climbing,
            Phase::PowerEndurance => self.power_endurance,
            Phase::Rehab => self.rehab,
        }
    }

    pub fn set(&mut self, phase: Phase, secs: u64) {
        let slot = match phase {
            Phase::Stretching => &mut self.stretching,
            Phase::Hangboard => &mut self.hangboard,
            Phase::Climbing => &mut self.climbing,
            Phase::PowerEndurance => &mut self.power_endurance,
            Phase::Rehab => &mut self.rehab,
        };
        *slot = secs;
    }

    pub fn total(&self) -> u64 {
        self.checked_total().unwrap_or(u64::MAX)
    }

    pub fn checked_total(&self) -> Option<u64> {
        Phase::ALL
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(self.get(*p)))
    }
}

/// Climbing tallies keyed by `{grade}_{statType}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClimbingStats(BTreeMap<StatKey, u64>);

impl ClimbingStats {
    pub fn get(&self, key: StatKey) -> u64 {
        self.0.get(&key).copied().unwrap_or(0)
    }

    /// Adds `delta` to the key, creating it if absent, and returns the delta actually
    /// applied. Counts never drop below zero.
    pub fn apply_delta(&mut self, key: StatKey, delta: i64) -> i64 {
        let slot = self.0.entry(key).or_insert(0);
        let before = i64::try_from(*slot).unwrap_or(i64::MAX);
        let after = before.saturating_add(delta).max(0);
        *slot = after as u64;
        after - before
    }

    pub fn set(&mut self, key: StatKey, count: u64) {
        self.0.insert(key, count);
    }

    pub fn total(&self) -> u64 {
        self.checked_total().unwrap_or(u64::MAX)
    }

    pub fn checked_total(&self) -> Option<u64> {
        self.0.values().try_fold(0u64, |acc, v| acc.checked_add(*v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatKey, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangboardSet {
    pub weight: Option<f64>,
    pub duration: Option<f64>,
    pub edge_size: EdgeSize,
}

impl Default for HangboardSet {
    fn default() -> Self {
        Self {
            weight: None,
            duration: Some(DEFAULT_HANG_SECS),
            edge_size: EdgeSize::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedPull {
    pub weight: Option<f64>,
    pub reps: Option<f64>,
}

impl WeightedPull {
    pub fn is_recorded(&self) -> bool {
        self.weight.is_some() || self.reps.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerEnduranceSet {
    pub grade: String,
}

/// Everything a finished workout reports: the part of a session that is
/// snapshotted for review, exported and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub durations: Durations,
    pub total_elapsed_seconds: u64,
    pub total_moves: u64,
    pub climbing_stats: ClimbingStats,
    pub hangboard_sets: Vec<HangboardSet>,
    pub weighted_pulls: Vec<WeightedPull>,
    pub power_endurance_sets: Vec<PowerEnduranceSet>,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            durations: Durations::default(),
            total_elapsed_seconds: 0,
            total_moves: 0,
            climbing_stats: ClimbingStats::default(),
            hangboard_sets: vec![HangboardSet::default(); HANGBOARD_SET_COUNT],
            weighted_pulls: vec![WeightedPull::default(); WEIGHTED_PULL_SET_COUNT],
            power_endurance_sets: vec![PowerEnduranceSet::default(); POWER_ENDURANCE_SET_COUNT],
        }
    }
}

impl SessionData {
    /// Applies a climbing tally delta to both the stat and the move total.
    pub fn record_climbing_stat(&mut self, key: StatKey, delta: i64) -> i64 {
        let applied = self.climbing_stats.apply_delta(key, delta);
        self.total_moves = self.total_moves.saturating_add_signed(applied);
        applied
    }

    /// `started_at` plus the total time, or `None` when that falls outside the
    /// representable calendar.
    pub fn ended_at(&self, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.total_elapsed_seconds).ok()?;
        started_at.checked_add_signed(TimeDelta::try_seconds(secs)?)
    }

    pub fn reset_climbing(&mut self) {
        self.total_moves = 0;
        self.climbing_stats = ClimbingStats::default();
    }

    /// Parses `text` for `target` and stores it. Duration edits recompute the total time
    /// and stat edits recompute the move total; rejected text leaves everything untouched.
    pub fn apply_edit(&mut self, target: FieldTarget, text: &str) -> Result<(), InputError> {
        let missing = || InputError::NoSuchField(target.label());
        match target {
            FieldTarget::Duration(phase) => {
                let secs = fields::parse_duration_text(text)?;
                let mut durations = self.durations;
                durations.set(phase, secs);
                let total = durations
                    .checked_total()
                    .ok_or_else(|| InputError::OutOfRange(text.to_string()))?;
                self.durations = durations;
                self.total_elapsed_seconds = total;
            }
            FieldTarget::TotalTime => {
                self.total_elapsed_seconds = fields::parse_total_time(text)?;
            }
            FieldTarget::ClimbingStat(key) => {
                let count = fields::parse_count(text)?;
                let mut stats = self.climbing_stats.clone();
                stats.set(key, count);
                let total = stats
                    .checked_total()
                    .ok_or_else(|| InputError::OutOfRange(text.to_string()))?;
                self.climbing_stats = stats;
                self.total_moves = total;
            }
            FieldTarget::HangboardWeight(i) => {
                let weight = fields::parse_optional_number(text)?;
                self.hangboard_sets.get_mut(i).ok_or_else(missing)?.weight = weight;
            }
            FieldTarget::HangboardDuration(i) => {
                let duration = fields::parse_optional_number(text)?;
                self.hangboard_sets.get_mut(i).ok_or_else(missing)?.duration = duration;
            }
            FieldTarget::HangboardEdge(i) => {
                let edge = fields::parse_edge_size(text)?;
                self.hangboard_sets.get_mut(i).ok_or_else(missing)?.edge_size = edge;
            }
            FieldTarget::PullWeight(i) => {
                let weight = fields::parse_optional_number(text)?;
                self.weighted_pulls.get_mut(i).ok_or_else(missing)?.weight = weight;
            }
            FieldTarget::PullReps(i) => {
                let reps = fields::parse_optional_number(text)?;
                self.weighted_pulls.get_mut(i).ok_or_else(missing)?.reps = reps;
            }
            FieldTarget::PowerEnduranceGrade(i) => {
                self.power_endurance_sets
                    .get_mut(i)
                    .ok_or_else(missing)?
                    .grade = text.to_string();
            }
        }
        Ok(())
    }
}

/// The live, in-progress workout.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub phase_index: usize,
    pub start_instant: Option<DateTime<Utc>>,
    pub phase_boundary_elapsed_seconds: u64,
    pub current_phase_elapsed_seconds: u64,
    pub data: SessionData,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase_index: 0,
            start_instant: None,
            phase_boundary_elapsed_seconds: 0,
            current_phase_elapsed_seconds: 0,
            data: SessionData::default(),
        }
    }
}

impl Session {
    pub fn current_phase(&self) -> Option<Phase> {
        Phase::from_index(self.phase_index)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase_index >= TERMINAL_PHASE
    }

    pub fn is_active(&self) -> bool {
        self.start_instant.is_some() && !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Grade, StatType};
    use assert_matches::assert_matches;

    fn key(grade: Grade, stat: StatType) -> StatKey {
        StatKey::new(grade, stat)
    }

    #[test]
    fn test_default_session_data_shape() {
        let data = SessionData::default();
        assert_eq!(data.hangboard_sets.len(), 6);
        assert_eq!(data.weighted_pulls.len(), 4);
        assert_eq!(data.power_endurance_sets.len(), 3);
        assert_eq!(data.hangboard_sets[0].duration, Some(8.0));
        assert_eq!(data.hangboard_sets[0].edge_size, EdgeSize::Ten);
        assert_eq!(data.hangboard_sets[0].weight, None);
    }

    #[test]
    fn test_record_climbing_stat_keeps_total_in_sync() {
        let mut data = SessionData::default();
        let sends = key(Grade::V5V6, StatType::Sends);
        let attempts = key(Grade::BelowV5, StatType::Attempts);

        let script = [(sends, 1), (attempts, 3), (sends, 1), (attempts, -1), (sends, -5)];
        for (k, delta) in script {
            data.record_climbing_stat(k, delta);
            assert_eq!(data.total_moves, data.climbing_stats.total());
        }
        assert_eq!(data.climbing_stats.get(sends), 0);
        assert_eq!(data.climbing_stats.get(attempts), 2);
        assert_eq!(data.total_moves, 2);
    }

    #[test]
    fn test_apply_duration_edit_recomputes_total() {
        let mut data = SessionData::default();
        data.apply_edit(FieldTarget::Duration(Phase::Stretching), "1m 5s")
            .unwrap();
        data.apply_edit(FieldTarget::Duration(Phase::Climbing), "300")
            .unwrap();
        assert_eq!(data.durations.stretching, 65);
        assert_eq!(data.total_elapsed_seconds, 365);
    }

    #[test]
    fn test_apply_stat_edit_recomputes_moves() {
        let mut data = SessionData::default();
        data.record_climbing_stat(key(Grade::V7V8, StatType::Attempts), 4);
        data.apply_edit(
            FieldTarget::ClimbingStat(key(Grade::V5V6, StatType::Sends)),
            "3",
        )
        .unwrap();
        assert_eq!(data.total_moves, 7);
    }

    #[test]
    fn test_oversized_duration_total_is_rejected() {
        let mut data = SessionData::default();
        data.durations.set(Phase::Stretching, u64::MAX);
        let before = data.clone();

        assert_matches!(
            data.apply_edit(FieldTarget::Duration(Phase::Rehab), "5"),
            Err(InputError::OutOfRange(_))
        );
        assert_eq!(data, before);
        assert_matches!(
            data.apply_edit(FieldTarget::Duration(Phase::Rehab), "18446744073709551615"),
            Err(InputError::OutOfRange(_))
        );
        assert_eq!(data, before);
    }

    #[test]
    fn test_oversized_move_total_is_rejected() {
        let mut data = SessionData::default();
        data.climbing_stats
            .set(key(Grade::V5V6, StatType::Sends), u64::MAX);
        let before = data.clone();

        assert_matches!(
            data.apply_edit(
                FieldTarget::ClimbingStat(key(Grade::V7V8, StatType::Sends)),
                "1"
            ),
            Err(InputError::OutOfRange(_))
        );
        assert_eq!(data, before);
    }

    #[test]
    fn test_ended_at_is_checked() {
        use chrono::TimeZone;
        let start = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut data = SessionData::default();
        data.total_elapsed_seconds = 3600;
        assert_eq!(data.ended_at(start), Some(start + TimeDelta::seconds(3600)));

        data.total_elapsed_seconds = u64::MAX;
        assert_eq!(data.ended_at(start), None);
        data.total_elapsed_seconds = i64::MAX as u64;
        assert_eq!(data.ended_at(start), None);
    }

    #[test]
    fn test_rejected_edit_leaves_data_untouched() {
        let mut data = SessionData::default();
        let before = data.clone();
        assert!(data
            .apply_edit(FieldTarget::HangboardWeight(0), "heavy")
            .is_err());
        assert!(data.apply_edit(FieldTarget::HangboardWeight(9), "5").is_err());
        assert_eq!(data, before);
    }

    #[test]
    fn test_weight_edits_clamp_and_clear() {
        let mut data = SessionData::default();
        data.apply_edit(FieldTarget::PullWeight(1), "-4").unwrap();
        assert_eq!(data.weighted_pulls[1].weight, Some(0.0));
        data.apply_edit(FieldTarget::PullWeight(1), "").unwrap();
        assert_eq!(data.weighted_pulls[1].weight, None);
    }

    #[test]
    fn test_session_data_json_roundtrip_uses_composite_keys() {
        let mut data = SessionData::default();
        data.record_climbing_stat(key(Grade::V5V6, StatType::Sends), 2);
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"V5-V6_sends\":2"));
        let back: SessionData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_session_state_predicates() {
        let mut session = Session::default();
        assert!(!session.is_active());
        assert_eq!(session.current_phase(), Some(Phase::Stretching));
        session.start_instant = Some(Utc::now());
        assert!(session.is_active());
        session.phase_index = TERMINAL_PHASE;
        assert!(session.is_terminal());
        assert!(!session.is_active());
        assert_eq!(session.current_phase(), None);
    }
}
