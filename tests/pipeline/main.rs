//! End-to-end pipeline tests: producers → Log Store → Shipper → object store.

mod common;

use common::{events_from_bytes, Pipeline};
use logship::buffer::{BufferConfig, EventBuffer, FlushOutcome, HttpTarget};
use logship::core::{Clock, EventSource, LogEvent};
use logship::durability::{EventSink, StoreConfig, UploadState, UploadStatus};
use logship::ingest::{router, IngestConfig, IngestService};
use logship::shipper::{ShipperConfig, ShipperStatus};
use std::sync::Arc;
use std::time::Duration;

fn uploaded_keys(pipeline: &Pipeline) -> Vec<String> {
    pipeline.remote.keys()
}

#[tokio::test]
async fn test_shipped_file_is_byte_identical() {
    let pipeline = Pipeline::new();
    let events = pipeline.write(25);
    let id = pipeline.store.rotate().unwrap().unwrap();
    let local = std::fs::read(id.segment_path(&pipeline.log_dir())).unwrap();

    let shipper = pipeline.shipper(ShipperConfig::for_testing());
    let report = shipper.run_cycle().await;
    assert_eq!(report.uploaded, vec![id]);

    let keys = uploaded_keys(&pipeline);
    assert_eq!(keys.len(), 1);
    let remote = pipeline.fetch(&keys[0]).await;
    assert_eq!(remote, local);
    assert_eq!(events_from_bytes(&remote), events);
}

#[tokio::test]
async fn test_second_run_puts_nothing() {
    let pipeline = Pipeline::new();
    pipeline.write(3);
    pipeline.store.rotate().unwrap();
    pipeline.write(3);
    pipeline.store.rotate().unwrap();

    pipeline.shipper(ShipperConfig::for_testing()).run_cycle().await;
    assert_eq!(pipeline.remote.put_count(), 2);

    // A restarted process sees the same files and uploads nothing.
    let report = pipeline.shipper(ShipperConfig::for_testing()).run_cycle().await;
    assert_eq!(report.attempted, 0);
    assert_eq!(pipeline.remote.put_count(), 2);
}

#[tokio::test]
async fn test_restart_resumes_failed_and_interrupted_uploads() {
    let pipeline = Pipeline::new();
    let ids: Vec<_> = (0..3)
        .map(|_| {
            pipeline.write(2);
            pipeline.store.rotate().unwrap().unwrap()
        })
        .collect();

    // First process: one put fails, then the process dies mid-attempt on
    // another file.
    pipeline.remote.fail_next_puts(1);
    let first = pipeline.shipper(ShipperConfig::for_testing().with_max_concurrency(1));
    let report = first.run_cycle().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].file, ids[0]);
    assert_eq!(report.uploaded, vec![ids[1], ids[2]]);

    let mut interrupted = first.states().load(ids[2]).unwrap().unwrap();
    assert_eq!(interrupted.status(), UploadStatus::Uploaded);
    interrupted = UploadState::pending(ids[2], pipeline.clock.now());
    interrupted.begin_upload().unwrap();
    first.states().save(&interrupted).unwrap();
    drop(first);

    // Second process.
    pipeline.clock.advance(Duration::from_secs(30));
    let second = pipeline.shipper(ShipperConfig::for_testing());
    assert_eq!(second.recover().unwrap(), 1);
    let report = second.run_cycle().await;
    assert_eq!(report.uploaded, vec![ids[0], ids[2]]);
    assert_eq!(report.already_present, 1, "interrupted file was already stored");

    let status: ShipperStatus = second.status();
    assert_eq!(status.uploaded, 3);
    assert_eq!(status.pending + status.failed + status.uploading, 0);
    // 1 injected failure + 3 successful puts; the interrupted file needed none.
    assert_eq!(pipeline.remote.put_count(), 4);
    assert_eq!(uploaded_keys(&pipeline).len(), 3);
}

#[tokio::test]
async fn test_ten_and_a_half_megabytes_rotate_into_two_files() {
    let pipeline = Pipeline::with_store_config(StoreConfig::default());
    let blob = "x".repeat(32 * 1024);
    let mut written = 0u64;
    let mut events = Vec::new();
    let mut i = 0;
    while written < 10_500_000 {
        let event = LogEvent::builder(EventSource::SystemMetric, format!("sample-{}", i))
            .timestamp(pipeline.clock.now())
            .field("blob", blob.as_str())
            .build()
            .unwrap();
        written += event.to_json_bytes().unwrap().len() as u64;
        pipeline.store.append(&event).unwrap();
        events.push(event);
        i += 1;
    }
    pipeline.store.rotate().unwrap();

    let closed = pipeline.store.list_closed_files().unwrap();
    assert_eq!(closed.len(), 2);
    let first_size = std::fs::metadata(&closed[0].path).unwrap().len();
    assert!(first_size <= 10 * 1024 * 1024);
    assert!(first_size > 10 * 1024 * 1024 - 64 * 1024);

    let report = pipeline
        .shipper(ShipperConfig::for_testing())
        .run_cycle()
        .await;
    assert_eq!(report.uploaded.len(), 2);

    // Keys sort by creation time and sequence, so concatenation follows
    // the write order
    let mut received = Vec::new();
    for key in uploaded_keys(&pipeline) {
        received.extend(events_from_bytes(&pipeline.fetch(&key).await));
    }
    assert_eq!(received, events);
}

#[tokio::test]
async fn test_buffered_events_reach_the_bucket_in_order() {
    let pipeline = Pipeline::new();
    let sink: Arc<dyn EventSink> = pipeline.store.clone();
    let service = Arc::new(
        IngestService::new(sink, IngestConfig::for_testing(), pipeline.clock.clone()).unwrap(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, router(service)).await });

    let target = HttpTarget::new(
        format!("http://{}/api/logs/batch", addr),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_session_id("session-7");
    let buffer = EventBuffer::new(
        BufferConfig::for_testing().with_max_items(10),
        Arc::new(target),
        pipeline.clock.clone(),
    );
    let sent: Vec<_> = (0..4).map(|i| pipeline.event(i)).collect();
    for event in &sent {
        buffer.enqueue(event.clone());
    }
    assert!(matches!(buffer.flush().await, FlushOutcome::Delivered(4)));
    server.abort();

    pipeline.store.rotate().unwrap();
    pipeline
        .shipper(ShipperConfig::for_testing())
        .run_cycle()
        .await;

    let keys = uploaded_keys(&pipeline);
    assert_eq!(keys.len(), 1);
    let received = events_from_bytes(&pipeline.fetch(&keys[0]).await);
    assert_eq!(received.len(), 4);
    for (sent, received) in sent.iter().zip(&received) {
        assert_eq!(received.id(), sent.id());
        assert_eq!(received.message(), sent.message());
        assert_eq!(received.level(), sent.level());
        assert_eq!(received.payload().get("session_id"), Some(&serde_json::json!("session-7")));
    }
}
