//! Per-tag fan-in: many producers, one draining consumer.
//!
//! Producers push into a lazily created [`RingQueue`] per tag. The consumer
//! calls [`TagFanIn::range_and_clear`], which swaps the whole map out under
//! the writer lock and only then hands the detached queues over. Producers
//! hold the reader lock for the entire push, so once the swap has happened no
//! push can still be writing into a detached queue: every item lands either in
//! a detached queue (drained now) or in a fresh successor (drained next pass).

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{QueueError, QueueResult};
use crate::ring::RingQueue;
use crate::stats::QueueStats;

/// Concurrent mapping from tag to bounded queue.
#[derive(Debug)]
pub struct TagFanIn<K, T> {
    queues: RwLock<HashMap<K, RingQueue<T>>>,
    queue_size: usize,
    stats: QueueStats,
}

impl<K, T> TagFanIn<K, T>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty fan-in whose per-tag queues hold at least `queue_size` items.
    #[must_use]
    pub fn new(queue_size: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            queue_size,
            stats: QueueStats::new(),
        }
    }

    /// Push `items` into the queue for `tag`, creating it on first use.
    ///
    /// Items that do not fit are dropped and counted.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] with the number of items accepted when the
    /// tag's queue filled up.
    pub fn push(&self, tag: &K, items: Vec<T>) -> QueueResult<usize> {
        let offered = items.len();
        let result = {
            let queues = self.queues.read();
            if let Some(queue) = queues.get(tag) {
                queue.push(items)
            } else {
                drop(queues);
                let mut queues = self.queues.write();
                let queue = queues.entry(tag.clone()).or_insert_with(|| {
                    trace!(queue_size = self.queue_size, "Creating queue for new tag");
                    RingQueue::new(self.queue_size)
                });
                queue.push(items)
            }
        };

        match result {
            Ok(pushed) => self.stats.record_queued(pushed),
            Err(QueueError::Full { pushed }) => {
                self.stats.record_queued(pushed);
                self.stats.record_dropped(offered.saturating_sub(pushed));
            }
            Err(QueueError::Empty { .. }) => {}
        }
        result
    }

    /// Detach every `(tag, queue)` pair and pass each to `f`.
    ///
    /// Returns the number of tags handed over. Tags that appear after the
    /// detachment are seen on the next call.
    pub fn range_and_clear<F>(&self, mut f: F) -> usize
    where
        F: FnMut(K, RingQueue<T>),
    {
        let detached = std::mem::take(&mut *self.queues.write());
        let tags = detached.len();
        for (tag, queue) in detached {
            f(tag, queue);
        }
        if tags > 0 {
            debug!(tags, "Detached tag queues");
        }
        tags
    }

    /// Detach everything and return each tag's items in queue order.
    /// Tags whose queue turned out empty are skipped.
    #[must_use]
    pub fn drain_all(&self) -> Vec<(K, Vec<T>)> {
        let mut drained = Vec::new();
        self.range_and_clear(|tag, queue| {
            let items = queue.drain();
            if !items.is_empty() {
                drained.push((tag, items));
            }
        });
        drained
    }

    /// Total items currently queued across all tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.read().values().map(RingQueue::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tags with a live queue.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.queues.read().len()
    }

    #[must_use]
    pub const fn stats(&self) -> &QueueStats {
        &self.stats
    }

    #[must_use]
    pub const fn queue_size(&self) -> usize {
        self.queue_size
    }
}
