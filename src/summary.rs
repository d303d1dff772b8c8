use chrono::{DateTime, Utc};

use crate::fields::{FieldTarget, InputError};
use crate::session::SessionData;

/// Review copy of a finished session. Taken once when the session turns
/// terminal; edits here never reach the live session.
#[derive(Debug, Clone, PartialEq)]
pub struct EditableSummary {
    started_at: Option<DateTime<Utc>>,
    data: SessionData,
}

impl EditableSummary {
    pub fn snapshot(started_at: Option<DateTime<Utc>>, live: &SessionData) -> Self {
        Self {
            started_at,
            data: live.clone(),
        }
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn apply_edit(&mut self, target: FieldTarget, text: &str) -> Result<(), InputError> {
        self.data.apply_edit(target, text)
    }
}
