//! FIFO hand-off between the listener and the worker pool.
//!
//! The queue is unbounded: under sustained overload accepted connections pile
//! up in memory. Nothing here applies back-pressure.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct AdmissionQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
}

impl<T> AdmissionQueue<T> {
    pub fn new() -> AdmissionQueue<T> {
        AdmissionQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `item` at the tail and wakes one blocked dequeuer.
    ///
    /// Once the queue is closed the item is handed back to the caller instead.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed.
    ///
    /// Returns `None` as soon as the queue is closed, even if items remain:
    /// those are left for [`AdmissionQueue::drain`].
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marks the queue closed and wakes every blocked dequeuer.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Removes everything still queued and releases the backing storage.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.lock();
        let items = std::mem::take(&mut state.items);
        items.into()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for AdmissionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
