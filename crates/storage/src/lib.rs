//! # splitd-storage
//!
//! In-memory holding area for impressions and events between the request
//! path and the flusher workers.
//!
//! - [`RingQueue`]: bounded, power-of-two, mutex-protected FIFO.
//! - [`TagFanIn`]: one lazily created queue per client tag, drained with
//!   [`TagFanIn::range_and_clear`].
//! - [`QueueStats`]: queued/dropped counters.
//!
//! Queues are lossy by design: a full queue drops the overflow and counts it,
//! and nothing survives a restart.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod error;
mod fanin;
mod ring;
mod stats;

pub use error::{QueueError, QueueResult};
pub use fanin::TagFanIn;
pub use ring::{RingQueue, capacity_for};
pub use stats::{QueueStats, StatsSnapshot};
