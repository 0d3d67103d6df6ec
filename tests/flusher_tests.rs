//! Single-flight behaviour of the flusher workers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use splitd::flusher::{Flusher, SyncOutcome};
use splitd::splitd_core::{
    ClientTag, Event, EventRecord, Impression, ImpressionsBatch, Recorder,
};
use splitd::splitd_storage::TagFanIn;
use tokio::sync::Notify;

/// Holds every upload until released.
#[derive(Default)]
struct GatedRecorder {
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl GatedRecorder {
    async fn hold(&self) -> splitd::splitd_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

#[async_trait]
impl Recorder for GatedRecorder {
    async fn record_impressions(&self, _: &ClientTag, _: ImpressionsBatch) -> splitd::splitd_core::Result<()> {
        self.hold().await
    }

    async fn record_events(&self, _: &ClientTag, _: Vec<EventRecord>) -> splitd::splitd_core::Result<()> {
        self.hold().await
    }
}

fn impression(key: &str) -> Impression {
    Impression {
        key: key.into(),
        bucketing_key: None,
        feature: "f".into(),
        treatment: "on".into(),
        label: "default rule".into(),
        change_number: 1,
        time: 1,
    }
}

#[tokio::test]
async fn test_concurrent_synchronize_runs_once() {
    let fan_in = Arc::new(TagFanIn::new(64));
    let recorder = Arc::new(GatedRecorder::default());
    let flusher = Arc::new(Flusher::new(
        Arc::clone(&fan_in),
        recorder.clone() as Arc<dyn Recorder>,
    ));
    fan_in
        .push(&ClientTag::new("a", "go-1"), vec![impression("k1"), impression("k2")])
        .unwrap();

    let first = tokio::spawn({
        let flusher = Arc::clone(&flusher);
        async move { flusher.synchronize().await }
    });
    tokio::time::timeout(Duration::from_secs(1), recorder.entered.notified())
        .await
        .expect("first flush never reached the recorder");
    assert!(flusher.is_running());

    fan_in.push(&ClientTag::new("a", "go-1"), vec![impression("k3")]).unwrap();
    let second = flusher.synchronize().await;
    assert!(second.is_skipped());
    assert_eq!(fan_in.len(), 1, "a skipped pass must leave the queues alone");

    recorder.release.notify_one();
    let SyncOutcome::Completed(report) = first.await.unwrap() else {
        panic!("first flush should complete");
    };
    assert_eq!(report.items, 2);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    assert!(!flusher.is_running());
}

fn event(key: &str) -> Event {
    Event {
        key: key.into(),
        traffic_type: "user".into(),
        event_type: "purchase".into(),
        value: Some(1.0),
        properties: None,
        timestamp: 1,
    }
}

#[tokio::test]
async fn test_concurrent_event_synchronize_runs_once() {
    let fan_in = Arc::new(TagFanIn::new(64));
    let recorder = Arc::new(GatedRecorder::default());
    let flusher = Arc::new(Flusher::new(
        Arc::clone(&fan_in),
        recorder.clone() as Arc<dyn Recorder>,
    ));
    let tag = ClientTag::new("a", "go-1");
    fan_in.push(&tag, vec![event("k1"), event("k2"), event("k3")]).unwrap();

    let first = tokio::spawn({
        let flusher = Arc::clone(&flusher);
        async move { flusher.synchronize().await }
    });
    tokio::time::timeout(Duration::from_secs(1), recorder.entered.notified())
        .await
        .expect("first flush never reached the recorder");

    fan_in.push(&tag, vec![event("k4")]).unwrap();
    assert!(flusher.synchronize().await.is_skipped());
    assert_eq!(fan_in.len(), 1);

    recorder.release.notify_one();
    let SyncOutcome::Completed(report) = first.await.unwrap() else {
        panic!("first flush should complete");
    };
    assert_eq!(report.items, 3);
    assert!(report.is_clean());
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);

    // The event left behind goes out on the next pass.
    recorder.release.notify_one();
    let SyncOutcome::Completed(report) = flusher.synchronize().await else {
        panic!("second flush should run");
    };
    assert_eq!(report.items, 1);
    assert_eq!(fan_in.len(), 0);
}

#[tokio::test]
async fn test_cancelled_flush_releases_running_flag() {
    let fan_in = Arc::new(TagFanIn::new(8));
    let recorder = Arc::new(GatedRecorder::default());
    let flusher = Arc::new(Flusher::new(
        Arc::clone(&fan_in),
        recorder.clone() as Arc<dyn Recorder>,
    ));
    fan_in.push(&ClientTag::new("a", "go-1"), vec![impression("k1")]).unwrap();

    let stalled = tokio::spawn({
        let flusher = Arc::clone(&flusher);
        async move { flusher.synchronize().await }
    });
    tokio::time::timeout(Duration::from_secs(1), recorder.entered.notified())
        .await
        .unwrap();
    assert!(flusher.is_running());

    stalled.abort();
    let _ = stalled.await;
    assert!(!flusher.is_running());
    assert!(!flusher.synchronize().await.is_skipped());
}
