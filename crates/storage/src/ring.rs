//! Fixed-size, mutex-protected ring queue.
//!
//! Capacity is always a power of two so that index arithmetic is a bitmask:
//!
//! ```text
//! len   = (head - tail) & mask
//! full  = ((head + 1) & mask) == tail
//! empty = head == tail
//! ```
//!
//! One slot is sacrificed to tell full from empty, so a queue of capacity
//! `2^k` holds at most `2^k - 1` items.

use parking_lot::Mutex;

use crate::error::{QueueError, QueueResult};

/// Multi-producer, multi-consumer bounded FIFO.
#[derive(Debug)]
pub struct RingQueue<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
}

#[derive(Debug)]
struct Ring<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    mask: usize,
}

impl<T> Ring<T> {
    const fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) & self.mask
    }

    const fn is_full(&self) -> bool {
        (self.head.wrapping_add(1) & self.mask) == self.tail
    }

    const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn push_one(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        match self.slots.get_mut(self.head) {
            Some(slot) => *slot = Some(item),
            None => return false,
        }
        self.head = self.head.wrapping_add(1) & self.mask;
        true
    }

    fn pop_one(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots.get_mut(self.tail).and_then(Option::take);
        self.tail = self.tail.wrapping_add(1) & self.mask;
        item
    }
}

/// Smallest power of two whose usable slots (`2^k - 1`) cover `approx_size`.
#[must_use]
pub const fn capacity_for(approx_size: usize) -> usize {
    let wanted = approx_size.saturating_add(1);
    let capacity = match wanted.checked_next_power_of_two() {
        Some(capacity) => capacity,
        None => 1 << (usize::BITS - 1),
    };
    if capacity < 2 { 2 } else { capacity }
}

impl<T> RingQueue<T> {
    /// Create a queue able to hold at least `approx_size` items.
    #[must_use]
    pub fn new(approx_size: usize) -> Self {
        Self::with_exact_capacity(capacity_for(approx_size))
    }

    /// Create a queue whose slot count is exactly `capacity`, rounded up to a
    /// power of two. Usable size is one less.
    #[must_use]
    pub fn with_exact_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).checked_next_power_of_two().unwrap_or(2);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                mask: capacity - 1,
            }),
            capacity,
        }
    }

    /// Number of slots (a power of two).
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum number of items the queue can hold at once.
    #[must_use]
    pub const fn usable(&self) -> usize {
        self.capacity - 1
    }

    /// Push items in order.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] with the number already pushed when the
    /// queue fills mid-batch. Remaining items are dropped.
    pub fn push(&self, items: impl IntoIterator<Item = T>) -> QueueResult<usize> {
        let mut ring = self.ring.lock();
        let mut pushed = 0usize;
        for item in items {
            if !ring.push_one(item) {
                return Err(QueueError::Full { pushed });
            }
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Pop up to `n` items, appending them to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] with the number popped when the queue
    /// empties before `n` items were taken.
    pub fn pop(&self, n: usize, out: &mut Vec<T>) -> QueueResult<usize> {
        let mut ring = self.ring.lock();
        let mut popped = 0usize;
        while popped < n {
            match ring.pop_one() {
                Some(item) => {
                    out.push(item);
                    popped += 1;
                }
                None => return Err(QueueError::Empty { popped }),
            }
        }
        Ok(popped)
    }

    /// Pop everything currently held.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        let mut ring = self.ring.lock();
        let mut out = Vec::with_capacity(ring.len());
        while let Some(item) = ring.pop_one() {
            out.push(item);
        }
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }
}
