use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of tracked phases; also the phase index of the summary state.
pub const PHASE_COUNT: usize = 5;
pub const TERMINAL_PHASE: usize = PHASE_COUNT;

/// A tracked stage of a workout, in the fixed order the session walks them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[strum(serialize = "stretching")]
    Stretching,
    #[strum(serialize = "hangboard")]
    Hangboard,
    #[strum(serialize = "climbing")]
    Climbing,
    #[strum(serialize = "power_endurance")]
    PowerEndurance,
    #[strum(serialize = "rehab")]
    Rehab,
}

impl Phase {
    pub const ALL: [Phase; PHASE_COUNT] = [
        Phase::Stretching,
        Phase::Hangboard,
        Phase::Climbing,
        Phase::PowerEndurance,
        Phase::Rehab,
    ];

    /// Maps a phase index to its phase; the terminal index has no phase.
    pub fn from_index(index: usize) -> Option<Phase> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Phase::Stretching => 0,
            Phase::Hangboard => 1,
            Phase::Climbing => 2,
            Phase::PowerEndurance => 3,
            Phase::Rehab => 4,
        }
    }

    /// Human readable title used by the UI and the row export.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Stretching => "Stretching",
            Phase::Hangboard => "Hangboard",
            Phase::Climbing => "Climbing",
            Phase::PowerEndurance => "Power Endurance",
            Phase::Rehab => "Rehab",
        }
    }

    pub fn is_last(self) -> bool {
        self.index() + 1 == PHASE_COUNT
    }
}

/// Bouldering grade buckets tallied during the climbing phase.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
pub enum Grade {
    #[strum(serialize = "<V5")]
    #[serde(rename = "<V5")]
    BelowV5,
    #[strum(serialize = "V5-V6")]
    #[serde(rename = "V5-V6")]
    V5V6,
    #[strum(serialize = "V7-V8")]
    #[serde(rename = "V7-V8")]
    V7V8,
    #[strum(serialize = "V9-V10")]
    #[serde(rename = "V9-V10")]
    V9V10,
    #[strum(serialize = "V11+")]
    #[serde(rename = "V11+")]
    V11Plus,
}

impl Grade {
    pub const ALL: [Grade; 5] = [
        Grade::BelowV5,
        Grade::V5V6,
        Grade::V7V8,
        Grade::V9V10,
        Grade::V11Plus,
    ];

    pub fn parse(s: &str) -> Option<Grade> {
        Self::ALL.iter().copied().find(|g| g.to_string() == s)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    #[strum(serialize = "attempts")]
    Attempts,
    #[strum(serialize = "sends")]
    Sends,
    #[strum(serialize = "flashes")]
    Flashes,
}

impl StatType {
    pub const ALL: [StatType; 3] = [StatType::Attempts, StatType::Sends, StatType::Flashes];

    pub fn parse(s: &str) -> Option<StatType> {
        Self::ALL.iter().copied().find(|t| t.to_string() == s)
    }

    pub fn label(self) -> &'static str {
        match self {
            StatType::Attempts => "Attempts",
            StatType::Sends => "Sends",
            StatType::Flashes => "Flashes",
        }
    }
}

/// Composite climbing stat key, rendered as `{grade}_{statType}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StatKey {
    pub grade: Grade,
    pub stat: StatType,
}

impl StatKey {
    pub fn new(grade: Grade, stat: StatType) -> Self {
        Self { grade, stat }
    }

    /// Every grade/stat combination in display order.
    pub fn all() -> impl Iterator<Item = StatKey> {
        Grade::ALL
            .into_iter()
            .flat_map(|g| StatType::ALL.into_iter().map(move |s| StatKey::new(g, s)))
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.grade, self.stat)
    }
}

impl From<StatKey> for String {
    fn from(key: StatKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for StatKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        // grades never contain '_', so the last underscore splits the key
        let (grade, stat) = value
            .rsplit_once('_')
            .ok_or_else(|| format!("malformed stat key: {value}"))?;
        match (Grade::parse(grade), StatType::parse(stat)) {
            (Some(grade), Some(stat)) => Ok(StatKey { grade, stat }),
            _ => Err(format!("unknown stat key: {value}")),
        }
    }
}

/// Hangboard edge depth in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum EdgeSize {
    Six,
    Eight,
    #[default]
    Ten,
}

impl EdgeSize {
    pub fn mm(self) -> u8 {
        match self {
            EdgeSize::Six => 6,
            EdgeSize::Eight => 8,
            EdgeSize::Ten => 10,
        }
    }

    /// Cycles 6 -> 8 -> 10 -> 6, the order of the radio buttons.
    pub fn next(self) -> Self {
        match self {
            EdgeSize::Six => EdgeSize::Eight,
            EdgeSize::Eight => EdgeSize::Ten,
            EdgeSize::Ten => EdgeSize::Six,
        }
    }
}

impl From<EdgeSize> for u8 {
    fn from(edge: EdgeSize) -> Self {
        edge.mm()
    }
}

impl TryFrom<u8> for EdgeSize {
    type Error = String;

    fn try_from(mm: u8) -> Result<Self, Self::Error> {
        match mm {
            6 => Ok(EdgeSize::Six),
            8 => Ok(EdgeSize::Eight),
            10 => Ok(EdgeSize::Ten),
            other => Err(format!("unsupported edge size: {other}mm")),
        }
    }
}
