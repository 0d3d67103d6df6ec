//! Concurrency tests for the tag fan-in.
//!
//! Producers push while a consumer repeatedly detaches queues; every item that
//! was accepted must come out exactly once, in per-producer order.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use proptest::prelude::*;
use splitd_storage::{QueueError, RingQueue, TagFanIn};

const PRODUCERS: usize = 8;
const PER_PRODUCER: u64 = 5_000;

#[test]
fn test_no_item_lost_under_concurrent_drain() {
    let fan_in: Arc<TagFanIn<String, (usize, u64)>> = Arc::new(TagFanIn::new(1 << 16));
    let done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let fan_in = Arc::clone(&fan_in);
            thread::spawn(move || {
                let tag = format!("tag-{}", p % 3);
                for seq in 0..PER_PRODUCER {
                    fan_in.push(&tag, vec![(p, seq)]).expect("queue sized to never fill");
                }
            })
        })
        .collect();

    let consumer = {
        let fan_in = Arc::clone(&fan_in);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut collected: Vec<(usize, u64)> = Vec::new();
            loop {
                let finished = done.load(Ordering::Acquire);
                fan_in.range_and_clear(|_, queue| collected.extend(queue.drain()));
                if finished {
                    break;
                }
                thread::yield_now();
            }
            collected
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let collected = consumer.join().unwrap();

    assert_eq!(collected.len(), PRODUCERS * PER_PRODUCER as usize);

    let mut last_seen: HashMap<usize, u64> = HashMap::new();
    for (producer, seq) in collected {
        if let Some(prev) = last_seen.insert(producer, seq) {
            assert!(seq > prev, "producer {producer} went backwards: {prev} then {seq}");
        }
    }
    assert_eq!(last_seen.len(), PRODUCERS);
    assert!(fan_in.is_empty());
    assert_eq!(fan_in.stats().snapshot().dropped, 0);
}

#[test]
fn test_accepted_plus_dropped_equals_offered() {
    let fan_in: Arc<TagFanIn<&'static str, u32>> = Arc::new(TagFanIn::new(64));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fan_in = Arc::clone(&fan_in);
            thread::spawn(move || {
                for _ in 0..100 {
                    let _ = fan_in.push(&"shared", vec![1, 2, 3]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = fan_in.stats().snapshot();
    assert_eq!(stats.queued + stats.dropped, 4 * 100 * 3);
    assert_eq!(stats.queued as usize, fan_in.len());
    assert_eq!(fan_in.len(), RingQueue::<u32>::new(64).usable());
}

proptest! {
    #[test]
    fn prop_ring_is_fifo_within_capacity(
        size in 1usize..64,
        items in proptest::collection::vec(any::<u32>(), 0..128),
    ) {
        let queue = RingQueue::new(size);
        let accepted = match queue.push(items.iter().copied()) {
            Ok(n) => n,
            Err(QueueError::Full { pushed }) => pushed,
            Err(other) => panic!("unexpected {other}"),
        };

        prop_assert_eq!(accepted, items.len().min(queue.usable()));
        prop_assert_eq!(queue.drain(), items[..accepted].to_vec());
    }

    #[test]
    fn prop_fan_in_keeps_per_tag_order(
        pushes in proptest::collection::vec((0u8..4, any::<u16>()), 0..200),
    ) {
        let fan_in: TagFanIn<u8, u16> = TagFanIn::new(256);
        let mut expected: HashMap<u8, Vec<u16>> = HashMap::new();
        for (tag, value) in &pushes {
            fan_in.push(tag, vec![*value]).unwrap();
            expected.entry(*tag).or_default().push(*value);
        }

        let drained: HashMap<u8, Vec<u16>> = fan_in.drain_all().into_iter().collect();
        prop_assert_eq!(drained, expected);
    }
}
