use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{elapsed_seconds, from_epoch_millis, to_epoch_millis, Clock, SystemClock};
use crate::durable::{DurableStore, StoreError, PHASE_KEY, SESSION_DATA_KEY, START_TIME_KEY};
use crate::fields::{FieldTarget, InputError};
use crate::phase::{Grade, Phase, StatKey, StatType, TERMINAL_PHASE};
use crate::session::{Session, SessionData};
use crate::summary::EditableSummary;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no session has been started")]
    NotStarted,
    #[error("session already finished")]
    AlreadyTerminal,
    #[error("session has not finished yet")]
    NotFinished,
    #[error("{0} can only be edited on the summary")]
    ReadOnlyField(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Inactive,
    Active(Phase),
    Terminal,
}

/// What `resume_from_durable_state` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Nothing to resume; the controller stays inactive at phase 0.
    Fresh,
    /// A finished session was left behind and has been wiped.
    ClearedStale,
    Resumed {
        phase_index: usize,
        restored_data: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedProgress {
    phase_boundary_elapsed_seconds: u64,
    data: SessionData,
}

/// Owns the in-progress workout and drives it through its phases.
///
/// Durable state is written synchronously with every transition: the start
/// instant while active, the phase index always, and the session aggregate
/// while active.
#[derive(Debug)]
pub struct PhaseSessionController<S: DurableStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    session: Session,
    summary: Option<EditableSummary>,
}

impl<S: DurableStore, C: Clock> PhaseSessionController<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            session: Session::default(),
            summary: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.session.is_terminal() {
            ControllerState::Terminal
        } else if self.session.start_instant.is_some() {
            ControllerState::Active(
                self.session
                    .current_phase()
                    .unwrap_or(Phase::Stretching),
            )
        } else {
            ControllerState::Inactive
        }
    }

    /// True while the one-second ticker should be scheduled.
    pub fn is_ticking(&self) -> bool {
        matches!(self.state(), ControllerState::Active(_))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn summary(&self) -> Option<&EditableSummary> {
        self.summary.as_ref()
    }

    /// Data exports and saves read: the summary once it exists, the live session otherwise.
    pub fn export_data(&self) -> &SessionData {
        self.summary
            .as_ref()
            .map(EditableSummary::data)
            .unwrap_or(&self.session.data)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Discards whatever was in progress and starts a fresh session at phase 0.
    pub fn start(&mut self) -> Result<&Session, SessionError> {
        let now = self.clock.now();
        if self.session.is_active() {
            warn!(
                "discarding unsaved session at phase {}",
                self.session.phase_index
            );
        }
        let session = Session {
            start_instant: Some(now),
            ..Session::default()
        };

        self.store.set(START_TIME_KEY, &to_epoch_millis(now))?;
        self.store.set(PHASE_KEY, "0")?;
        write_progress(&mut self.store, &session)?;
        self.session = session;
        self.summary = None;
        info!("session started at {}", now.to_rfc3339());
        Ok(&self.session)
    }

    /// Recomputes elapsed time from the start instant.
    pub fn tick(&mut self) -> Result<&Session, SessionError> {
        self.require_active()?;
        self.refresh_elapsed();
        Ok(&self.session)
    }

    /// Records the current phase's duration and moves to the next phase. Completing
    /// the last phase freezes the session and takes the summary snapshot.
    pub fn complete_phase(&mut self) -> Result<&Session, SessionError> {
        let phase = self.require_active().inspect_err(|e| {
            warn!("complete_phase ignored: {e}");
        })?;
        self.refresh_elapsed();

        // Durable keys are written before the in-memory session moves on.
        let mut next = self.session.clone();
        next.data
            .durations
            .set(phase, next.current_phase_elapsed_seconds);
        next.phase_boundary_elapsed_seconds = next
            .phase_boundary_elapsed_seconds
            .max(next.data.total_elapsed_seconds);
        next.current_phase_elapsed_seconds = 0;
        next.phase_index += 1;

        if next.phase_index == Phase::Climbing.index() {
            next.data.reset_climbing();
        }

        let summary = if next.is_terminal() {
            let started_at = next.start_instant.take();
            self.store.remove(START_TIME_KEY)?;
            self.store.set(PHASE_KEY, &TERMINAL_PHASE.to_string())?;
            self.store.remove(SESSION_DATA_KEY)?;
            Some(EditableSummary::snapshot(started_at, &next.data))
        } else {
            self.store.set(PHASE_KEY, &next.phase_index.to_string())?;
            write_progress(&mut self.store, &next)?;
            None
        };

        info!("{} complete after {}s", phase, next.data.durations.get(phase));
        if summary.is_some() {
            info!("session finished, total {}s", next.data.total_elapsed_seconds);
            self.summary = summary;
        }
        self.session = next;
        Ok(&self.session)
    }

    /// Applies a tally delta to `{grade}_{stat}` and to the move total. Returns the new total.
    pub fn record_climbing_stat(
        &mut self,
        grade: Grade,
        stat: StatType,
        delta: i64,
    ) -> Result<u64, SessionError> {
        self.require_active()?;
        let key = StatKey::new(grade, stat);
        let applied = self.session.data.record_climbing_stat(key, delta);
        if applied != delta {
            debug!("{key} clamped delta {delta} to {applied}");
        }
        self.persist_progress()?;
        Ok(self.session.data.total_moves)
    }

    /// Edits a phase-form field on the live session.
    pub fn edit_form(&mut self, target: FieldTarget, text: &str) -> Result<(), SessionError> {
        self.require_active()?;
        if !target.is_live_editable() {
            return Err(SessionError::ReadOnlyField(target.label()));
        }
        self.session.data.apply_edit(target, text)?;
        self.persist_progress()?;
        Ok(())
    }

    /// Edits the review snapshot; the live session is never touched.
    pub fn edit_summary(&mut self, target: FieldTarget, text: &str) -> Result<(), SessionError> {
        let summary = self.summary.as_mut().ok_or(SessionError::NotFinished)?;
        summary.apply_edit(target, text)?;
        Ok(())
    }

    /// Called once at process start with whatever the durable store holds.
    pub fn resume_from_durable_state(&mut self) -> Result<ResumeOutcome, SessionError> {
        let start = self
            .store
            .get(START_TIME_KEY)?
            .as_deref()
            .and_then(from_epoch_millis);
        let phase = self
            .store
            .get(PHASE_KEY)?
            .and_then(|raw| raw.trim().parse::<usize>().ok());

        let start = match (start, phase) {
            (Some(start), phase) if phase.unwrap_or(0) < TERMINAL_PHASE => start,
            (_, Some(phase)) if phase >= TERMINAL_PHASE => {
                info!("clearing finished session left from a previous run");
                self.reset()?;
                return Ok(ResumeOutcome::ClearedStale);
            }
            _ => return Ok(ResumeOutcome::Fresh),
        };

        let phase_index = phase.unwrap_or(0);
        let progress = self.load_progress();
        let restored_data = progress.is_some();
        let (boundary, data) = progress
            .map(|p| (p.phase_boundary_elapsed_seconds, p.data))
            .unwrap_or_default();

        self.session = Session {
            phase_index,
            start_instant: Some(start),
            phase_boundary_elapsed_seconds: boundary,
            current_phase_elapsed_seconds: 0,
            data,
        };
        self.summary = None;
        self.refresh_elapsed();
        info!(
            "resumed session at phase {} ({}s elapsed, data restored: {})",
            phase_index, self.session.data.total_elapsed_seconds, restored_data
        );
        Ok(ResumeOutcome::Resumed {
            phase_index,
            restored_data,
        })
    }

    /// Back to inactive at phase 0, durable keys cleared.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.session = Session::default();
        self.summary = None;
        self.store.remove(START_TIME_KEY)?;
        self.store.remove(PHASE_KEY)?;
        self.store.remove(SESSION_DATA_KEY)?;
        Ok(())
    }

    fn require_active(&self) -> Result<Phase, SessionError> {
        match self.state() {
            ControllerState::Active(phase) => Ok(phase),
            ControllerState::Inactive => Err(SessionError::NotStarted),
            ControllerState::Terminal => Err(SessionError::AlreadyTerminal),
        }
    }

    fn refresh_elapsed(&mut self) {
        if let Some(start) = self.session.start_instant {
            let total = elapsed_seconds(start, self.clock.now());
            self.session.data.total_elapsed_seconds = total;
            self.session.current_phase_elapsed_seconds =
                total.saturating_sub(self.session.phase_boundary_elapsed_seconds);
        }
    }

    fn persist_progress(&mut self) -> Result<(), StoreError> {
        write_progress(&mut self.store, &self.session)
    }

    fn load_progress(&self) -> Option<PersistedProgress> {
        let raw = match self.store.get(SESSION_DATA_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("could not read saved session data: {e}");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!("ignoring corrupt session data: {e}"))
            .ok()
    }
}

fn write_progress<S: DurableStore>(store: &mut S, session: &Session) -> Result<(), StoreError> {
    let progress = PersistedProgress {
        phase_boundary_elapsed_seconds: session.phase_boundary_elapsed_seconds,
        data: session.data.clone(),
    };
    let json = serde_json::to_string(&progress)?;
    store.set(SESSION_DATA_KEY, &json)
}
