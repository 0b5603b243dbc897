//! Pure state machine tests for job enums.

use crate::database::{JobMode, JobStage, JobStatus};

#[test]
fn test_initial_stage_per_mode() {
    assert_eq!(JobMode::Full.initial_stage(), JobStage::Summary);
    assert_eq!(JobMode::SummaryOnly.initial_stage(), JobStage::Summary);
    assert_eq!(JobMode::AudioOnly.initial_stage(), JobStage::Audio);
}

#[test]
fn test_terminal_statuses() {
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(JobStatus::Canceled.is_terminal());
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
    assert!(!JobStatus::Paused.is_terminal());
}

#[test]
fn test_legal_transitions() {
    use JobStatus::*;

    assert!(Queued.can_transition_to(Running));
    assert!(Queued.can_transition_to(Paused));
    assert!(Queued.can_transition_to(Canceled));
    assert!(Running.can_transition_to(Paused));
    assert!(Running.can_transition_to(Canceled));
    assert!(Running.can_transition_to(Completed));
    assert!(Running.can_transition_to(Queued));
    assert!(Paused.can_transition_to(Queued));
    assert!(Paused.can_transition_to(Canceled));
}

#[test]
fn test_failure_reachable_from_non_terminal_only() {
    use JobStatus::*;

    for status in [Queued, Running, Paused] {
        assert!(status.can_transition_to(Failed), "{status} -> failed");
    }
    for status in [Completed, Failed, Canceled] {
        assert!(!status.can_transition_to(Failed), "{status} -> failed");
    }
}

#[test]
fn test_illegal_transitions() {
    use JobStatus::*;

    assert!(!Queued.can_transition_to(Completed));
    assert!(!Paused.can_transition_to(Running));
    assert!(!Paused.can_transition_to(Completed));
    for terminal in [Completed, Failed, Canceled] {
        for target in [Queued, Running, Paused, Completed, Canceled] {
            assert!(!terminal.can_transition_to(target), "{terminal} -> {target}");
        }
    }
}

#[test]
fn test_string_roundtrips() {
    for status in [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Canceled,
    ] {
        assert_eq!(JobStatus::try_from(status.as_str()).unwrap(), status);
    }
    for mode in [JobMode::Full, JobMode::SummaryOnly, JobMode::AudioOnly] {
        assert_eq!(JobMode::try_from(mode.as_str()).unwrap(), mode);
    }
    for stage in [JobStage::Summary, JobStage::Audio] {
        assert_eq!(JobStage::try_from(stage.as_str()).unwrap(), stage);
    }
    assert!(JobStatus::try_from("sleeping").is_err());
}
