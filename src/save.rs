use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::clock::Clock;
use crate::controller::PhaseSessionController;
use crate::durable::DurableStore;
use crate::export::attribute_rows;
use crate::gateway::{Credentials, GatewayError, NewSession, SessionGateway};
use crate::session::SessionData;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("session has no start time to save")]
    MissingStartTime,

    #[error("total time of {total_secs}s puts the end time out of range")]
    EndTimeOutOfRange { total_secs: u64 },

    #[error(
        "user id mismatch for {athlete}: signed in as {authenticated}, user table says {persisted}"
    )]
    IdentityMismatch {
        athlete: String,
        authenticated: String,
        persisted: String,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Everything a save needs, detached from the controller so it can cross threads.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub athlete: String,
    pub credentials: Credentials,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub data: SessionData,
}

impl SaveRequest {
    /// Reads the summary snapshot when the session is finished, the live session otherwise.
    pub fn from_controller<S: DurableStore, C: Clock>(
        athlete: &str,
        credentials: Credentials,
        controller: &PhaseSessionController<S, C>,
    ) -> Result<Self, SaveError> {
        let data = controller.export_data().clone();
        let started_at = match controller.summary() {
            Some(summary) => summary.started_at(),
            None => controller.session().start_instant,
        }
        .ok_or(SaveError::MissingStartTime)?;
        let ended_at = data
            .ended_at(started_at)
            .ok_or(SaveError::EndTimeOutOfRange {
                total_secs: data.total_elapsed_seconds,
            })?;

        Ok(Self {
            athlete: athlete.to_string(),
            credentials,
            started_at,
            ended_at,
            data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReceipt {
    pub session_id: i64,
    pub rows_written: usize,
}

/// Authenticates, verifies the athlete's user row, then writes the session and
/// its attribute rows. Stops at the first failure; rows already written stay.
pub fn save_session<G: SessionGateway + ?Sized>(
    gateway: &mut G,
    request: &SaveRequest,
) -> Result<SaveReceipt, SaveError> {
    info!("saving session for {}", request.athlete);
    let identity = gateway.authenticate(&request.athlete, &request.credentials)?;
    let persisted = gateway.find_user_by_name(&request.athlete)?;

    if persisted != identity.user_id {
        error!(
            "refusing to save: {} authenticated as {} but user row is {}",
            request.athlete, identity.user_id, persisted
        );
        if let Err(e) = gateway.sign_out() {
            warn!("sign out after identity mismatch failed: {e}");
        }
        return Err(SaveError::IdentityMismatch {
            athlete: request.athlete.clone(),
            authenticated: identity.user_id,
            persisted,
        });
    }

    let session_id = gateway.insert_session(&NewSession {
        user_id: persisted,
        start_time: request.started_at,
        end_time: request.ended_at,
    })?;

    let rows = attribute_rows(session_id, &request.data);
    gateway.insert_attribute_rows(&rows)?;
    info!("saved session {session_id} with {} rows", rows.len());

    Ok(SaveReceipt {
        session_id,
        rows_written: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::durable::MemoryStore;
    use crate::export::AttributeRow;
    use crate::gateway::Identity;
    use crate::phase::{Grade, StatType};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use std::cell::RefCell;

    /// In-process gateway that records what it was asked to do.
    #[derive(Default)]
    struct RecordingGateway {
        auth_user_id: String,
        table_user_id: String,
        identity: Option<Identity>,
        signed_out: bool,
        fail_rows: bool,
        sessions: RefCell<Vec<NewSession>>,
        rows: RefCell<Vec<AttributeRow>>,
    }

    impl RecordingGateway {
        fn consistent(id: &str) -> Self {
            Self {
                auth_user_id: id.into(),
                table_user_id: id.into(),
                ..Default::default()
            }
        }
    }

    impl SessionGateway for RecordingGateway {
        fn authenticate(
            &mut self,
            athlete: &str,
            _credentials: &Credentials,
        ) -> Result<Identity, GatewayError> {
            let identity = Identity::new(athlete, self.auth_user_id.clone(), "token");
            self.identity = Some(identity.clone());
            Ok(identity)
        }

        fn sign_out(&mut self) -> Result<(), GatewayError> {
            self.identity = None;
            self.signed_out = true;
            Ok(())
        }

        fn current_identity(&self) -> Option<&Identity> {
            self.identity.as_ref()
        }

        fn find_user_by_name(&self, _name: &str) -> Result<String, GatewayError> {
            Ok(self.table_user_id.clone())
        }

        fn insert_session(&self, session: &NewSession) -> Result<i64, GatewayError> {
            self.sessions.borrow_mut().push(session.clone());
            Ok(41 + self.sessions.borrow().len() as i64)
        }

        fn insert_attribute_rows(&self, rows: &[AttributeRow]) -> Result<(), GatewayError> {
            if self.fail_rows {
                return Err(GatewayError::Rejected {
                    operation: "attribute insert",
                    status: 500,
                    body: String::new(),
                });
            }
            self.rows.borrow_mut().extend_from_slice(rows);
            Ok(())
        }
    }

    fn finished_controller() -> PhaseSessionController<MemoryStore, ManualClock> {
        let clock = ManualClock::at_secs(1_700_000_000);
        let mut c = PhaseSessionController::new(MemoryStore::new(), clock.clone());
        c.start().unwrap();
        c.complete_phase().unwrap();
        c.complete_phase().unwrap();
        c.record_climbing_stat(Grade::V7V8, StatType::Sends, 4)
            .unwrap();
        clock.advance_secs(600);
        c.complete_phase().unwrap();
        c.complete_phase().unwrap();
        c.complete_phase().unwrap();
        c
    }

    fn creds() -> Credentials {
        Credentials {
            email: "alex@example.com".into(),
            password: "pw".into(),
        }
    }

    #[test]
    fn request_uses_summary_total_for_end_time() {
        let mut c = finished_controller();
        c.edit_summary(crate::fields::FieldTarget::TotalTime, "1:00")
            .unwrap();
        let request = SaveRequest::from_controller("alex", creds(), &c).unwrap();
        assert_eq!(request.ended_at - request.started_at, Duration::seconds(3600));
        assert_eq!(request.data.total_elapsed_seconds, 3600);
    }

    #[test]
    fn request_with_unrepresentable_end_time_fails() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::seconds(100);
        let mut c = PhaseSessionController::new(MemoryStore::new(), ManualClock::new(late));
        c.start().unwrap();
        for _ in 0..5 {
            c.complete_phase().unwrap();
        }
        c.edit_summary(crate::fields::FieldTarget::TotalTime, "1:00")
            .unwrap();

        assert_matches!(
            SaveRequest::from_controller("alex", creds(), &c),
            Err(SaveError::EndTimeOutOfRange { total_secs: 3600 })
        );
    }

    #[test]
    fn request_without_start_fails() {
        let c = PhaseSessionController::new(MemoryStore::new(), ManualClock::at_secs(0));
        assert_matches!(
            SaveRequest::from_controller("alex", creds(), &c),
            Err(SaveError::MissingStartTime)
        );
    }

    #[test]
    fn save_writes_session_then_rows() {
        let c = finished_controller();
        let request = SaveRequest::from_controller("alex", creds(), &c).unwrap();
        let mut gateway = RecordingGateway::consistent("uid-1");

        let receipt = save_session(&mut gateway, &request).unwrap();

        assert_eq!(receipt.session_id, 42);
        let sessions = gateway.sessions.borrow();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_id, "uid-1");
        assert_eq!(sessions[0].end_time - sessions[0].start_time, Duration::seconds(600));

        let rows = gateway.rows.borrow();
        assert_eq!(rows.len(), receipt.rows_written);
        assert!(rows.iter().all(|r| r.session_id == 42));
        assert!(rows
            .iter()
            .any(|r| r.variable_name == "V7-V8_sends" && r.value == "4"));
    }

    #[test]
    fn identity_mismatch_aborts_and_signs_out() {
        let c = finished_controller();
        let request = SaveRequest::from_controller("alex", creds(), &c).unwrap();
        let mut gateway = RecordingGateway {
            auth_user_id: "uid-1".into(),
            table_user_id: "uid-2".into(),
            ..Default::default()
        };

        let err = save_session(&mut gateway, &request).unwrap_err();
        assert_matches!(err, SaveError::IdentityMismatch { .. });
        assert!(gateway.signed_out);
        assert!(gateway.current_identity().is_none());
        assert!(gateway.sessions.borrow().is_empty());
    }

    #[test]
    fn row_failure_leaves_session_row_written() {
        let c = finished_controller();
        let request = SaveRequest::from_controller("alex", creds(), &c).unwrap();
        let mut gateway = RecordingGateway {
            fail_rows: true,
            ..RecordingGateway::consistent("uid-1")
        };

        assert_matches!(
            save_session(&mut gateway, &request),
            Err(SaveError::Gateway(GatewayError::Rejected { status: 500, .. }))
        );
        assert_eq!(gateway.sessions.borrow().len(), 1);
    }
}
