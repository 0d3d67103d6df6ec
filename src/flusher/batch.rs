//! How each queued kind becomes a recorder call.

use futures::future::BoxFuture;
use splitd_core::{ClientTag, Event, EventRecord, Impression, Recorder, group_by_feature};

/// An item the flusher knows how to upload.
pub trait FlushItem: Send + Sync + Sized + 'static {
    /// Name used in logs and recorder errors.
    const KIND: &'static str;

    /// Format one tag's items and hand them to the recorder.
    fn upload<'a>(
        recorder: &'a dyn Recorder,
        tag: &'a ClientTag,
        items: Vec<Self>,
    ) -> BoxFuture<'a, splitd_core::Result<()>>;
}

impl FlushItem for Impression {
    const KIND: &'static str = "impressions";

    fn upload<'a>(
        recorder: &'a dyn Recorder,
        tag: &'a ClientTag,
        items: Vec<Self>,
    ) -> BoxFuture<'a, splitd_core::Result<()>> {
        recorder.record_impressions(tag, group_by_feature(items))
    }
}

impl FlushItem for Event {
    const KIND: &'static str = "events";

    fn upload<'a>(
        recorder: &'a dyn Recorder,
        tag: &'a ClientTag,
        items: Vec<Self>,
    ) -> BoxFuture<'a, splitd_core::Result<()>> {
        recorder.record_events(tag, items.into_iter().map(EventRecord::from).collect())
    }
}
