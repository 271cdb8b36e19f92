use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Thread-safe FIFO shared between producers, stages and the renderer.
///
/// Capacity is unbounded internally; depth is policed by callers with
/// [`trim_to`](Self::trim_to), which drops the oldest items first. Every
/// operation takes the single queue mutex for its critical section only,
/// and the blocking pops are the only calls that wait while holding it.
///
/// A queue is always owned through an `Arc` by the threads using it, so it
/// cannot be destroyed under a blocked waiter: `pop_front_blocking` simply
/// waits until an item arrives.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Appends an item and wakes at most one blocked waiter.
    pub fn push_back(&self, item: T) {
        {
            let mut items = self.items.lock();
            items.push_back(item);
        }
        self.not_empty.notify_one();
    }

    /// Removes and returns the oldest item, waiting until one exists.
    pub fn pop_front_blocking(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Like [`pop_front_blocking`](Self::pop_front_blocking) but gives up
    /// after `timeout`.
    pub fn pop_front_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.not_empty.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    pub fn try_pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Pops everything currently queued and returns only the newest item.
    pub fn drain_to_latest(&self) -> Option<T> {
        let mut items = self.items.lock();
        let latest = items.pop_back();
        items.clear();
        latest
    }

    /// Drops oldest items until at most `depth` remain; returns how many
    /// were dropped.
    pub fn trim_to(&self, depth: usize) -> usize {
        let mut items = self.items.lock();
        let excess = items.len().saturating_sub(depth);
        items.drain(..excess);
        excess
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T: Clone> BoundedQueue<T> {
    pub fn peek_front(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }

    pub fn peek_back(&self) -> Option<T> {
        self.items.lock().back().cloned()
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
