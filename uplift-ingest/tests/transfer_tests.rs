//! Transfer driver tests: retries, exhaustion, cancellation, progress

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockSink, PendingSink};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uplift_common::{EventBus, UpliftEvent};
use uplift_ingest::models::{PipelineStage, UploadSession};
use uplift_ingest::services::registry::SessionRegistry;
use uplift_ingest::services::transfer::{TransferDriver, UploadSink};

const FILE_SIZE: u64 = 4096;

fn driver(
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn UploadSink>,
    bus: EventBus,
    retries: u32,
) -> TransferDriver {
    TransferDriver::new(registry, sink, bus, retries, Arc::new(Notify::new()))
        .with_backoff_base(Duration::from_millis(1))
}

async fn register(registry: &SessionRegistry) -> uuid::Uuid {
    let session = UploadSession::new("orders.csv".to_string(), FILE_SIZE, ".csv".to_string());
    let id = session.session_id();
    registry.register(session).await.unwrap();
    id
}

#[tokio::test]
async fn successful_transfer_reaches_queued_with_monotone_progress() {
    let registry = Arc::new(SessionRegistry::new());
    let bus = EventBus::new(256);
    let mut events = bus.subscribe();
    let id = register(&registry).await;

    driver(
        registry.clone(),
        Arc::new(MockSink::accepting("pl-42")),
        bus,
        3,
    )
    .run(id, vec![0u8; FILE_SIZE as usize], CancellationToken::new())
    .await;

    let session = registry.get(id).await.unwrap();
    assert_eq!(session.stage(), PipelineStage::Queued);
    assert_eq!(session.pipeline_id(), Some("pl-42"));
    assert_eq!(session.progress_pct(), 90);
    assert!(session.last_error().is_none());

    // Broadcast progress values rise from 0 toward 90, never decreasing
    let mut observed = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            UpliftEvent::TransferProgress { progress_pct, .. } => observed.push(progress_pct),
            UpliftEvent::StageChanged {
                old_stage,
                new_stage,
                ..
            } => {
                assert_eq!(old_stage, PipelineStage::Transferring);
                assert_eq!(new_stage, PipelineStage::Queued);
            }
            _ => {}
        }
    }
    assert!(!observed.is_empty());
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*observed.last().unwrap(), 90);
}

#[tokio::test]
async fn transient_failures_within_bound_are_invisible() {
    let registry = Arc::new(SessionRegistry::new());
    let bus = EventBus::new(256);
    let id = register(&registry).await;

    // Fails 1st and 2nd attempt, succeeds on the 3rd
    driver(
        registry.clone(),
        Arc::new(MockSink::failing_first(2, "pl-9")),
        bus,
        3,
    )
    .run(id, vec![0u8; FILE_SIZE as usize], CancellationToken::new())
    .await;

    let session = registry.get(id).await.unwrap();
    assert_eq!(session.stage(), PipelineStage::Queued);
    assert_eq!(session.transfer_attempt(), 3);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn exhausted_retries_fail_with_descriptive_reason() {
    let registry = Arc::new(SessionRegistry::new());
    let bus = EventBus::new(256);
    let mut events = bus.subscribe();
    let id = register(&registry).await;

    driver(
        registry.clone(),
        Arc::new(MockSink::failing_first(10, "pl-9")),
        bus,
        3,
    )
    .run(id, vec![0u8; FILE_SIZE as usize], CancellationToken::new())
    .await;

    let session = registry.get(id).await.unwrap();
    assert_eq!(session.stage(), PipelineStage::Failed);
    assert_eq!(session.transfer_attempt(), 3);
    let reason = session.last_error().expect("failure reason");
    assert!(reason.contains("transfer failed after 3 attempts"), "{}", reason);

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if let UpliftEvent::SessionFailed { error, .. } = event {
            assert!(error.contains("transfer failed after 3 attempts"));
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn cancellation_fails_the_session_immediately() {
    let registry = Arc::new(SessionRegistry::new());
    let bus = EventBus::new(256);
    let id = register(&registry).await;
    let cancel = CancellationToken::new();

    let driver = driver(registry.clone(), Arc::new(PendingSink), bus, 3);
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { driver.run(id, vec![0u8; FILE_SIZE as usize], cancel).await }
    });

    // Give the driver a moment to enter the attempt, then cancel
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("driver stops on cancellation")
        .unwrap();

    let session = registry.get(id).await.unwrap();
    assert_eq!(session.stage(), PipelineStage::Failed);
    assert_eq!(session.last_error(), Some("cancelled"));
}

#[tokio::test]
async fn unknown_session_is_a_no_op() {
    let registry = Arc::new(SessionRegistry::new());
    let bus = EventBus::new(16);
    driver(
        registry.clone(),
        Arc::new(MockSink::accepting("pl-1")),
        bus,
        3,
    )
    .run(uuid::Uuid::new_v4(), vec![1, 2, 3], CancellationToken::new())
    .await;
    assert!(registry.is_empty().await);
}
