//! Upload session state machine tests
//!
//! Covers the forward-only stage order, direct-failure jumps, and the
//! monotone progress display across the whole lifecycle.

use uplift_ingest::models::{PipelineStage, UploadSession};

fn session(size: u64) -> UploadSession {
    UploadSession::new("orders.csv".to_string(), size, ".csv".to_string())
}

#[test]
fn new_session_starts_validated_with_zero_progress() {
    let s = session(1000);
    assert_eq!(s.stage(), PipelineStage::Validated);
    assert_eq!(s.progress_pct(), 0);
    assert!(s.last_error().is_none());
    assert!(!s.is_terminal());
}

#[test]
fn full_lifecycle_follows_stage_order_and_reaches_100() {
    let mut s = session(10 * 1024 * 1024);
    let mut observed = vec![s.progress_pct()];

    assert_eq!(s.begin_attempt(), Some(1));
    assert_eq!(s.stage(), PipelineStage::Transferring);

    // Transfer progress rises from 0 toward 90
    for acked in [1_000_000u64, 5_000_000, 10 * 1024 * 1024] {
        s.record_transfer_progress(acked);
        observed.push(s.progress_pct());
    }
    assert_eq!(s.progress_pct(), 90);

    let t = s.mark_queued("pl-7".to_string()).expect("queued transition");
    assert_eq!(t.old_stage, PipelineStage::Transferring);
    assert_eq!(t.new_stage, PipelineStage::Queued);
    assert_eq!(s.pipeline_id(), Some("pl-7"));
    observed.push(s.progress_pct());
    assert_eq!(s.progress_pct(), 90);

    for (stage, floor) in [
        (PipelineStage::Normalizing, 93),
        (PipelineStage::QualityCheck, 96),
        (PipelineStage::Succeeded, 100),
    ] {
        let transitions = s.apply_stage_report(stage, None);
        assert_eq!(transitions.len(), 1);
        assert_eq!(s.stage(), stage);
        observed.push(s.progress_pct());
        assert_eq!(s.progress_pct(), floor);
    }

    assert!(s.is_terminal());
    // Observed progress sequence is non-decreasing, terminal value exactly 100
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*observed.last().unwrap(), 100);
}

#[test]
fn skipped_stage_report_advances_stepwise() {
    let mut s = session(100);
    s.begin_attempt();
    s.mark_queued("pl-1".to_string());

    // Poller missed Normalizing; report jumps straight to QualityCheck
    let transitions = s.apply_stage_report(PipelineStage::QualityCheck, Some(42));
    let stages: Vec<_> = transitions.iter().map(|t| (t.old_stage, t.new_stage)).collect();
    assert_eq!(
        stages,
        vec![
            (PipelineStage::Queued, PipelineStage::Normalizing),
            (PipelineStage::Normalizing, PipelineStage::QualityCheck),
        ]
    );
    assert_eq!(s.stage(), PipelineStage::QualityCheck);
    assert_eq!(s.rows_processed(), Some(42));
}

#[test]
fn stale_report_never_regresses_stage() {
    let mut s = session(100);
    s.begin_attempt();
    s.mark_queued("pl-1".to_string());
    s.apply_stage_report(PipelineStage::QualityCheck, None);

    let transitions = s.apply_stage_report(PipelineStage::Normalizing, Some(7));
    assert!(transitions.is_empty());
    assert_eq!(s.stage(), PipelineStage::QualityCheck);
    // Rows are still refreshed from a stale report
    assert_eq!(s.rows_processed(), Some(7));
}

#[test]
fn reports_cannot_move_a_transferring_session() {
    let mut s = session(100);
    s.begin_attempt();
    let transitions = s.apply_stage_report(PipelineStage::Normalizing, None);
    assert!(transitions.is_empty());
    assert_eq!(s.stage(), PipelineStage::Transferring);
}

#[test]
fn failure_is_reachable_from_any_non_terminal_stage() {
    for setup in [
        |_: &mut UploadSession| {},
        |s: &mut UploadSession| {
            s.begin_attempt();
        },
        |s: &mut UploadSession| {
            s.begin_attempt();
            s.mark_queued("pl-1".to_string());
        },
        |s: &mut UploadSession| {
            s.begin_attempt();
            s.mark_queued("pl-1".to_string());
            s.apply_stage_report(PipelineStage::Normalizing, None);
        },
    ] {
        let mut s = session(100);
        setup(&mut s);
        let t = s.fail("schema mismatch").expect("transition to Failed");
        assert_eq!(t.new_stage, PipelineStage::Failed);
        assert_eq!(s.last_error(), Some("schema mismatch"));
        assert!(s.is_terminal());
    }
}

#[test]
fn failure_retains_last_progress_value() {
    let mut s = session(100);
    s.begin_attempt();
    s.mark_queued("pl-1".to_string());
    s.apply_stage_report(PipelineStage::Normalizing, None);
    assert_eq!(s.progress_pct(), 93);

    s.fail("schema mismatch");
    assert_eq!(s.progress_pct(), 93);
}

#[test]
fn fail_is_idempotent_on_terminal_sessions() {
    let mut s = session(100);
    s.fail("first reason");
    assert!(s.fail("second reason").is_none());
    assert_eq!(s.last_error(), Some("first reason"));

    // Stage reports are also inert once terminal
    assert!(s.apply_stage_report(PipelineStage::Succeeded, None).is_empty());
    assert_eq!(s.stage(), PipelineStage::Failed);
}

#[test]
fn retry_starts_a_fresh_transfer_phase() {
    let mut s = session(1000);
    assert_eq!(s.begin_attempt(), Some(1));
    s.record_transfer_progress(800);
    assert_eq!(s.progress_pct(), 72);

    // New attempt resets acknowledged bytes and displayed progress
    assert_eq!(s.begin_attempt(), Some(2));
    assert_eq!(s.bytes_acknowledged(), 0);
    assert_eq!(s.progress_pct(), 0);

    // Within the new attempt progress is monotone again
    s.record_transfer_progress(500);
    let mid = s.progress_pct();
    s.record_transfer_progress(400); // stale ack, ignored
    assert_eq!(s.progress_pct(), mid);
}

#[test]
fn begin_attempt_refuses_terminal_sessions() {
    let mut s = session(100);
    s.fail("cancelled");
    assert_eq!(s.begin_attempt(), None);
}

#[test]
fn poll_failure_counting_resets_on_success() {
    let mut s = session(100);
    assert_eq!(s.note_poll_failure(), 1);
    assert_eq!(s.note_poll_failure(), 2);
    s.clear_poll_failures();
    assert_eq!(s.note_poll_failure(), 1);
}

#[test]
fn snapshots_round_trip_without_exposing_setters() {
    // Serialized snapshots carry every field; deserialization rebuilds an
    // equivalent session, and no public setter exists for any field.
    let mut s = session(100);
    s.begin_attempt();
    s.record_transfer_progress(50);

    let value = serde_json::to_value(&s).unwrap();
    assert_eq!(value["stage"], "TRANSFERRING");
    assert_eq!(value["bytes_acknowledged"], 50);

    let restored: UploadSession = serde_json::from_value(value).unwrap();
    assert_eq!(restored.session_id(), s.session_id());
    assert_eq!(restored.stage(), s.stage());
    assert_eq!(restored.progress_pct(), s.progress_pct());
}
