// Simulates process restarts by reopening the same SQLite file.

use tempfile::tempdir;

use crimp::clock::ManualClock;
use crimp::controller::{ControllerState, PhaseSessionController, ResumeOutcome};
use crimp::durable::{DurableStore, SqliteStore, PHASE_KEY, SESSION_DATA_KEY, START_TIME_KEY};
use crimp::fields::FieldTarget;
use crimp::phase::{Grade, Phase, StatType};

#[test]
fn reload_mid_session_keeps_timer_and_tallies() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("state.db");
    let clock = ManualClock::at_secs(1_700_000_000);

    {
        let mut c = PhaseSessionController::new(SqliteStore::open(&db).unwrap(), clock.clone());
        c.start().unwrap();
        clock.advance_secs(120);
        c.complete_phase().unwrap();
        c.edit_form(FieldTarget::PullReps(1), "6").unwrap();
        clock.advance_secs(300);
        c.complete_phase().unwrap();
        c.record_climbing_stat(Grade::BelowV5, StatType::Attempts, 5)
            .unwrap();
        clock.advance_secs(45);
    }

    let mut c = PhaseSessionController::new(SqliteStore::open(&db).unwrap(), clock.clone());
    assert_eq!(
        c.resume_from_durable_state().unwrap(),
        ResumeOutcome::Resumed {
            phase_index: 2,
            restored_data: true
        }
    );
    assert_eq!(c.state(), ControllerState::Active(Phase::Climbing));
    let session = c.session();
    assert_eq!(session.data.total_elapsed_seconds, 465);
    assert_eq!(session.current_phase_elapsed_seconds, 45);
    assert_eq!(session.data.durations.stretching, 120);
    assert_eq!(session.data.durations.hangboard, 300);
    assert_eq!(session.data.weighted_pulls[1].reps, Some(6.0));
    assert_eq!(session.data.total_moves, 5);

    clock.advance_secs(15);
    c.complete_phase().unwrap();
    assert_eq!(c.session().data.durations.climbing, 60);
}

#[test]
fn reload_after_finish_starts_clean() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("state.db");
    let clock = ManualClock::at_secs(1_700_000_000);

    {
        let mut c = PhaseSessionController::new(SqliteStore::open(&db).unwrap(), clock.clone());
        c.start().unwrap();
        for _ in 0..5 {
            clock.advance_secs(10);
            c.complete_phase().unwrap();
        }
    }

    let mut c = PhaseSessionController::new(SqliteStore::open(&db).unwrap(), clock);
    assert_eq!(
        c.resume_from_durable_state().unwrap(),
        ResumeOutcome::ClearedStale
    );
    assert_eq!(c.state(), ControllerState::Inactive);
    let store = c.store();
    for key in [START_TIME_KEY, PHASE_KEY, SESSION_DATA_KEY] {
        assert_eq!(store.get(key).unwrap(), None, "{key} should be cleared");
    }
}

#[test]
fn explicit_reset_discards_progress() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("state.db");
    let clock = ManualClock::at_secs(1_700_000_000);

    {
        let mut c = PhaseSessionController::new(SqliteStore::open(&db).unwrap(), clock.clone());
        c.start().unwrap();
        c.complete_phase().unwrap();
        c.reset().unwrap();
    }

    let mut c = PhaseSessionController::new(SqliteStore::open(&db).unwrap(), clock);
    assert_eq!(c.resume_from_durable_state().unwrap(), ResumeOutcome::Fresh);
}
