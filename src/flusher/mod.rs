//! Flusher workers: drain a fan-in and hand each tag's batch to the recorder.
//!
//! At most one [`Flusher::synchronize`] runs per worker. A call that finds
//! another in flight returns [`SyncOutcome::Skipped`] without touching the
//! queues. Recorder failures are collected into the report and the data is
//! not retried.

mod batch;
mod driver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::future::join_all;
use splitd_core::{ClientTag, Recorder};
use splitd_storage::TagFanIn;
use tracing::{debug, info, warn};

pub use batch::FlushItem;
pub use driver::run_periodic;

/// One failed per-tag upload.
#[derive(Debug)]
pub struct FlushFailure {
    pub tag: ClientTag,
    pub items: usize,
    pub error: splitd_core::Error,
}

/// What one synchronisation pass did.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub tags: usize,
    pub items: usize,
    pub failures: Vec<FlushFailure>,
    pub duration_ms: u64,
}

impl FlushReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Items whose upload was rejected.
    #[must_use]
    pub fn failed_items(&self) -> usize {
        self.failures.iter().map(|f| f.items).sum()
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed(FlushReport),
    /// Another synchronisation was already running.
    Skipped,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Clears the running flag when dropped, including on cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight uploader for one kind of queued item.
pub struct Flusher<T> {
    fan_in: Arc<TagFanIn<ClientTag, T>>,
    recorder: Arc<dyn Recorder>,
    running: AtomicBool,
}

impl<T> std::fmt::Debug for Flusher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("queue_size", &self.fan_in.queue_size())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: FlushItem> Flusher<T> {
    #[must_use]
    pub fn new(fan_in: Arc<TagFanIn<ClientTag, T>>, recorder: Arc<dyn Recorder>) -> Self {
        Self {
            fan_in,
            recorder,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn fan_in(&self) -> &Arc<TagFanIn<ClientTag, T>> {
        &self.fan_in
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Drain every tag and upload concurrently.
    pub async fn synchronize(&self) -> SyncOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            debug!(kind = T::KIND, "Flush already in progress, skipping");
            return SyncOutcome::Skipped;
        };

        let start = Instant::now();
        let drained = self.fan_in.drain_all();
        let recorder = self.recorder.as_ref();

        let uploads = drained.into_iter().map(|(tag, items)| async move {
            let count = items.len();
            let result = T::upload(recorder, &tag, items).await;
            (tag, count, result)
        });

        let mut report = FlushReport::default();
        for (tag, items, result) in join_all(uploads).await {
            report.tags += 1;
            report.items += items;
            if let Err(error) = result {
                warn!(kind = T::KIND, tag = %tag, items, error = %error, "Upload failed, batch dropped");
                report.failures.push(FlushFailure { tag, items, error });
            }
        }
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if report.tags > 0 {
            let stats = self.fan_in.stats().snapshot();
            info!(
                kind = T::KIND,
                tags = report.tags,
                items = report.items,
                failed = report.failed_items(),
                duration_ms = report.duration_ms,
                queued_total = stats.queued,
                dropped_total = stats.dropped,
                "Flush complete"
            );
        }
        SyncOutcome::Completed(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use splitd_core::{Event, EventRecord, Impression, ImpressionsBatch};

    use super::*;

    #[derive(Default)]
    struct CapturingRecorder {
        impressions: Mutex<Vec<(ClientTag, ImpressionsBatch)>>,
        events: Mutex<Vec<(ClientTag, Vec<EventRecord>)>>,
        fail_tag: Option<String>,
    }

    #[async_trait]
    impl Recorder for CapturingRecorder {
        async fn record_impressions(
            &self,
            tag: &ClientTag,
            batch: ImpressionsBatch,
        ) -> splitd_core::Result<()> {
            if self.fail_tag.as_deref() == Some(tag.id.as_str()) {
                return Err(splitd_core::Error::recorder("impressions", tag.to_string(), "HTTP 500"));
            }
            self.impressions.lock().push((tag.clone(), batch));
            Ok(())
        }

        async fn record_events(
            &self,
            tag: &ClientTag,
            batch: Vec<EventRecord>,
        ) -> splitd_core::Result<()> {
            self.events.lock().push((tag.clone(), batch));
            Ok(())
        }
    }

    fn impression(key: &str, feature: &str) -> Impression {
        Impression {
            key: key.into(),
            bucketing_key: None,
            feature: feature.into(),
            treatment: "on".into(),
            label: "default rule".into(),
            change_number: 7,
            time: 1,
        }
    }

    #[tokio::test]
    async fn test_impressions_grouped_per_tag() {
        let fan_in = Arc::new(TagFanIn::new(16));
        let recorder = Arc::new(CapturingRecorder::default());
        let tag_a = ClientTag::new("a", "go-1");
        let tag_b = ClientTag::new("b", "go-1");
        fan_in
            .push(&tag_a, vec![impression("k1", "f1"), impression("k2", "f2"), impression("k3", "f1")])
            .unwrap();
        fan_in.push(&tag_b, vec![impression("k4", "f3")]).unwrap();

        let flusher = Flusher::new(Arc::clone(&fan_in), recorder.clone() as Arc<dyn Recorder>);
        let SyncOutcome::Completed(report) = flusher.synchronize().await else {
            panic!("expected a completed flush");
        };
        assert_eq!(report.tags, 2);
        assert_eq!(report.items, 4);
        assert!(report.is_clean());
        assert!(fan_in.is_empty());

        let mut calls = recorder.impressions.lock().clone();
        calls.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(calls[0].0, tag_a);
        let features: Vec<_> = calls[0].1.iter().map(|g| g.feature.as_str()).collect();
        assert_eq!(features, vec!["f1", "f2"]);
        assert_eq!(calls[0].1[0].impressions.len(), 2);
        assert_eq!(calls[1].0, tag_b);
    }

    #[tokio::test]
    async fn test_failed_tag_is_reported_not_retried() {
        let fan_in = Arc::new(TagFanIn::new(16));
        let recorder = Arc::new(CapturingRecorder {
            fail_tag: Some("bad".into()),
            ..CapturingRecorder::default()
        });
        fan_in.push(&ClientTag::new("bad", "go-1"), vec![impression("k", "f")]).unwrap();
        fan_in.push(&ClientTag::new("good", "go-1"), vec![impression("k", "f")]).unwrap();

        let flusher = Flusher::new(Arc::clone(&fan_in), recorder.clone() as Arc<dyn Recorder>);
        let SyncOutcome::Completed(report) = flusher.synchronize().await else {
            panic!("expected a completed flush");
        };
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].tag.id, "bad");
        assert_eq!(report.failed_items(), 1);
        assert_eq!(recorder.impressions.lock().len(), 1);

        let SyncOutcome::Completed(second) = flusher.synchronize().await else {
            panic!("expected a completed flush");
        };
        assert_eq!(second.tags, 0);
    }

    #[tokio::test]
    async fn test_events_pass_through_in_order() {
        let fan_in = Arc::new(TagFanIn::new(16));
        let recorder = Arc::new(CapturingRecorder::default());
        let tag = ClientTag::new("a", "py-2");
        let events = (0..3)
            .map(|i| Event {
                key: format!("k{i}"),
                traffic_type: "user".into(),
                event_type: "click".into(),
                value: None,
                properties: None,
                timestamp: i,
            })
            .collect();
        fan_in.push(&tag, events).unwrap();

        let flusher = Flusher::new(fan_in, recorder.clone() as Arc<dyn Recorder>);
        assert!(!flusher.synchronize().await.is_skipped());

        let calls = recorder.events.lock();
        assert_eq!(calls.len(), 1);
        let keys: Vec<_> = calls[0].1.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["k0", "k1", "k2"]);
    }

    #[test]
    fn test_running_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        let guard = RunningGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(RunningGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(RunningGuard::acquire(&flag).is_some());
    }
}
