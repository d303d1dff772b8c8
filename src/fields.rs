//! Text parsing, formatting and validation for the editable fields of the
//! phase forms and the end-of-session summary.

use crate::phase::{EdgeSize, Phase, StatKey};
use crate::session::SessionData;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("not a duration (try 10m 30s): {0:?}")]
    BadDuration(String),
    #[error("not a total time (try 1:30): {0:?}")]
    BadTotalTime(String),
    #[error("not a count: {0:?}")]
    BadCount(String),
    #[error("edge size must be 6, 8 or 10: {0:?}")]
    BadEdgeSize(String),
    #[error("too large: {0:?}")]
    OutOfRange(String),
    #[error("no such field: {0}")]
    NoSuchField(String),
}

/// Largest time any single duration field or the total may hold (one week).
pub const MAX_TRACKED_SECS: u64 = 7 * 24 * 60 * 60;
/// Largest value a single climbing tally may hold.
pub const MAX_COUNT: u64 = 1_000_000;

/// How a field's text is checked as the user types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    TimeString,
    TotalTimeString,
    Text,
}

impl FieldKind {
    /// Keystroke-level check. Passing text may still fail to parse when applied.
    pub fn accepts(self, text: &str) -> bool {
        match self {
            FieldKind::Number => text.is_empty() || text.trim().parse::<f64>().is_ok(),
            FieldKind::TimeString => text
                .chars()
                .all(|c| c.is_ascii_digit() || c == 'm' || c == 's' || c.is_whitespace()),
            FieldKind::TotalTimeString => text.chars().all(|c| c.is_ascii_digit() || c == ':'),
            FieldKind::Text => true,
        }
    }
}

/// Empty text means "not recorded"; negative numbers clamp to zero.
pub fn parse_optional_number(text: &str) -> Result<Option<f64>, InputError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(if v <= 0.0 { 0.0 } else { v })),
        _ => Err(InputError::NotANumber(text.to_string())),
    }
}

/// Non-negative whole count; empty text reads as zero.
pub fn parse_count(text: &str) -> Result<u64, InputError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let count = trimmed
        .parse::<u64>()
        .map_err(|_| InputError::BadCount(text.to_string()))?;
    within(count, MAX_COUNT, text)
}

fn within(value: u64, max: u64, text: &str) -> Result<u64, InputError> {
    if value > max {
        Err(InputError::OutOfRange(text.to_string()))
    } else {
        Ok(value)
    }
}

pub fn parse_edge_size(text: &str) -> Result<EdgeSize, InputError> {
    text.trim()
        .trim_end_matches("mm")
        .parse::<u8>()
        .ok()
        .and_then(|mm| EdgeSize::try_from(mm).ok())
        .ok_or_else(|| InputError::BadEdgeSize(text.to_string()))
}

/// Parses `10m 30s`, `5m`, `45s` or a bare `120` (seconds) into seconds.
/// A bare number is only allowed as the final token.
pub fn parse_duration_text(text: &str) -> Result<u64, InputError> {
    let bad = || InputError::BadDuration(text.to_string());
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut total: u64 = 0;

    for (i, token) in tokens.iter().enumerate() {
        let mut digits = String::new();
        for c in token.chars() {
            match c {
                '0'..='9' => digits.push(c),
                'm' | 's' => {
                    let n: u64 = digits.parse().map_err(|_| bad())?;
                    let secs = if c == 'm' {
                        n.checked_mul(60).ok_or_else(bad)?
                    } else {
                        n
                    };
                    total = total.checked_add(secs).ok_or_else(bad)?;
                    digits.clear();
                }
                _ => return Err(bad()),
            }
        }
        if !digits.is_empty() {
            if i + 1 != tokens.len() {
                return Err(bad());
            }
            let n: u64 = digits.parse().map_err(|_| bad())?;
            total = total.checked_add(n).ok_or_else(bad)?;
        }
    }

    within(total, MAX_TRACKED_SECS, text)
}

/// Parses `H:MM` (or bare minutes) into seconds.
pub fn parse_total_time(text: &str) -> Result<u64, InputError> {
    let bad = || InputError::BadTotalTime(text.to_string());
    let part = |s: &str| -> Result<u64, InputError> {
        if s.is_empty() {
            Ok(0)
        } else {
            s.parse::<u64>().map_err(|_| bad())
        }
    };

    let parts: Vec<&str> = text.trim().split(':').collect();
    let minutes = match parts.as_slice() {
        [minutes] => part(*minutes)?,
        [hours, minutes] => part(*hours)?
            .checked_mul(60)
            .and_then(|h| h.checked_add(part(*minutes).ok()?))
            .ok_or_else(bad)?,
        _ => return Err(bad()),
    };
    let secs = minutes.checked_mul(60).ok_or_else(bad)?;
    within(secs, MAX_TRACKED_SECS, text)
}

pub fn format_duration(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

pub fn format_total_time(secs: u64) -> String {
    format!("{}:{:02}", secs / 3600, (secs % 3600) / 60)
}

pub fn format_number(value: f64) -> String {
    value.to_string()
}

pub fn format_optional_number(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

/// Identifies one editable value inside a [`SessionData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Duration(Phase),
    TotalTime,
    ClimbingStat(StatKey),
    HangboardWeight(usize),
    HangboardDuration(usize),
    HangboardEdge(usize),
    PullWeight(usize),
    PullReps(usize),
    PowerEnduranceGrade(usize),
}

impl FieldTarget {
    pub fn kind(self) -> FieldKind {
        match self {
            FieldTarget::Duration(_) => FieldKind::TimeString,
            FieldTarget::TotalTime => FieldKind::TotalTimeString,
            FieldTarget::PowerEnduranceGrade(_) => FieldKind::Text,
            _ => FieldKind::Number,
        }
    }

    pub fn label(self) -> String {
        match self {
            FieldTarget::Duration(phase) => format!("{} Duration", phase.label()),
            FieldTarget::TotalTime => "Total Time".to_string(),
            FieldTarget::ClimbingStat(key) => format!("{} {}", key.grade, key.stat.label()),
            FieldTarget::HangboardWeight(i) => format!("Hang Set {} Weight (lbs)", i + 1),
            FieldTarget::HangboardDuration(i) => format!("Hang Set {} Duration (s)", i + 1),
            FieldTarget::HangboardEdge(i) => format!("Hang Set {} Edge (mm)", i + 1),
            FieldTarget::PullWeight(i) => format!("Pull Set {} Weight (lbs)", i + 1),
            FieldTarget::PullReps(i) => format!("Pull Set {} Reps", i + 1),
            FieldTarget::PowerEnduranceGrade(i) => format!("PE Climb {} Grade", i + 1),
        }
    }

    /// The stored value rendered the way the field displays it.
    pub fn current_text(self, data: &SessionData) -> String {
        match self {
            FieldTarget::Duration(phase) => format_duration(data.durations.get(phase)),
            FieldTarget::TotalTime => format_total_time(data.total_elapsed_seconds),
            FieldTarget::ClimbingStat(key) => data.climbing_stats.get(key).to_string(),
            FieldTarget::HangboardWeight(i) => data
                .hangboard_sets
                .get(i)
                .map(|s| format_optional_number(s.weight))
                .unwrap_or_default(),
            FieldTarget::HangboardDuration(i) => data
                .hangboard_sets
                .get(i)
                .map(|s| format_optional_number(s.duration))
                .unwrap_or_default(),
            FieldTarget::HangboardEdge(i) => data
                .hangboard_sets
                .get(i)
                .map(|s| s.edge_size.mm().to_string())
                .unwrap_or_default(),
            FieldTarget::PullWeight(i) => data
                .weighted_pulls
                .get(i)
                .map(|s| format_optional_number(s.weight))
                .unwrap_or_default(),
            FieldTarget::PullReps(i) => data
                .weighted_pulls
                .get(i)
                .map(|s| format_optional_number(s.reps))
                .unwrap_or_default(),
            FieldTarget::PowerEnduranceGrade(i) => data
                .power_endurance_sets
                .get(i)
                .map(|s| s.grade.clone())
                .unwrap_or_default(),
        }
    }

    /// The hangboard and power-endurance form, in display order.
    pub fn hangboard_form() -> Vec<FieldTarget> {
        let sets = (0..crate::session::HANGBOARD_SET_COUNT).flat_map(|i| {
            [
                FieldTarget::HangboardWeight(i),
                FieldTarget::HangboardDuration(i),
                FieldTarget::HangboardEdge(i),
            ]
        });
        let pulls = (0..crate::session::WEIGHTED_PULL_SET_COUNT)
            .flat_map(|i| [FieldTarget::PullWeight(i), FieldTarget::PullReps(i)]);
        sets.chain(pulls).collect()
    }

    pub fn power_endurance_form() -> Vec<FieldTarget> {
        (0..crate::session::POWER_ENDURANCE_SET_COUNT)
            .map(FieldTarget::PowerEnduranceGrade)
            .collect()
    }

    /// Every field the summary review exposes.
    pub fn summary_form() -> Vec<FieldTarget> {
        Phase::ALL
            .into_iter()
            .map(FieldTarget::Duration)
            .chain(std::iter::once(FieldTarget::TotalTime))
            .chain(StatKey::all().map(FieldTarget::ClimbingStat))
            .chain(Self::hangboard_form())
            .chain(Self::power_endurance_form())
            .collect()
    }

    /// Fields belonging to the live form for a phase; phases without a form have none.
    pub fn form_for(phase: Phase) -> Vec<FieldTarget> {
        match phase {
            Phase::Hangboard => Self::hangboard_form(),
            Phase::PowerEndurance => Self::power_endurance_form(),
            _ => Vec::new(),
        }
    }

    pub fn is_live_editable(self) -> bool {
        !matches!(
            self,
            FieldTarget::Duration(_) | FieldTarget::TotalTime | FieldTarget::ClimbingStat(_)
        )
    }
}

/// In-progress text for one field. The text always follows keystrokes; the
/// invalid flag is purely visual and tells the caller not to propagate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEditor {
    target: FieldTarget,
    text: String,
    invalid: bool,
}

impl FieldEditor {
    pub fn new(target: FieldTarget, initial: String) -> Self {
        Self {
            target,
            text: initial,
            invalid: false,
        }
    }

    pub fn target(&self) -> FieldTarget {
        self.target
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Returns whether the new text passed the keystroke check.
    pub fn push(&mut self, c: char) -> bool {
        self.text.push(c);
        self.revalidate()
    }

    pub fn backspace(&mut self) -> bool {
        self.text.pop();
        self.revalidate()
    }

    /// Flags text that passed the keystroke check but was rejected on apply.
    pub fn mark_invalid(&mut self) {
        self.invalid = true;
    }

    /// Replaces the text with the authoritative value and clears the flag.
    pub fn refresh(&mut self, text: String) {
        self.text = text;
        self.invalid = false;
    }

    fn revalidate(&mut self) -> bool {
        self.invalid = !self.target.kind().accepts(&self.text);
        !self.invalid
    }
}
