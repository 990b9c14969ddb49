//! Global readers-writer gate shared by every request.
//!
//! Fetches run concurrently with each other; a store or append excludes every
//! other request, whatever file it names. Releasing a write hands the gate
//! straight to a waiting writer, if there is one, before any waiting reader
//! gets in, so a steady stream of writers can starve readers.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct AccessState {
    readers: usize,
    writer_active: bool,
    waiting_readers: usize,
    waiting_writers: usize,
    /// Set when a releasing writer passed the gate on without clearing
    /// `writer_active`; the next writer through takes it.
    handoff: bool,
}

/// Point-in-time copy of the gate's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessSnapshot {
    pub readers: usize,
    pub writer_active: bool,
    pub waiting_readers: usize,
    pub waiting_writers: usize,
}

#[derive(Debug, Default)]
pub struct AccessCoordinator {
    state: Mutex<AccessState>,
    safe_to_read: Condvar,
    safe_to_write: Condvar,
}

/// Held while a fetch runs. Dropping it releases read access.
#[must_use = "read access is released as soon as the guard is dropped"]
pub struct ReadAccess<'a> {
    gate: &'a AccessCoordinator,
}

/// Held while a store or append runs. Dropping it releases write access.
#[must_use = "write access is released as soon as the guard is dropped"]
pub struct WriteAccess<'a> {
    gate: &'a AccessCoordinator,
}

impl AccessCoordinator {
    pub fn new() -> AccessCoordinator {
        AccessCoordinator::default()
    }

    fn lock(&self) -> MutexGuard<'_, AccessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while a writer is active, then joins the active readers.
    pub fn read(&self) -> ReadAccess<'_> {
        let mut state = self.lock();
        state.waiting_readers += 1;
        while state.writer_active {
            state = self
                .safe_to_read
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_readers -= 1;
        state.readers += 1;
        ReadAccess { gate: self }
    }

    /// Blocks while a writer or any reader is active, then becomes the writer.
    pub fn write(&self) -> WriteAccess<'_> {
        let mut state = self.lock();
        state.waiting_writers += 1;
        loop {
            if state.handoff {
                state.handoff = false;
                break;
            }
            if !state.writer_active && state.readers == 0 {
                state.writer_active = true;
                break;
            }
            state = self
                .safe_to_write
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_writers -= 1;
        WriteAccess { gate: self }
    }

    pub fn snapshot(&self) -> AccessSnapshot {
        let state = self.lock();
        AccessSnapshot {
            readers: state.readers,
            writer_active: state.writer_active,
            waiting_readers: state.waiting_readers,
            waiting_writers: state.waiting_writers,
        }
    }

    fn release_read(&self) {
        let mut state = self.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.safe_to_write.notify_one();
        }
    }

    fn release_write(&self) {
        let mut state = self.lock();
        if state.waiting_writers > 0 {
            state.handoff = true;
            self.safe_to_write.notify_one();
        } else {
            state.writer_active = false;
            self.safe_to_read.notify_all();
        }
    }
}

impl Drop for ReadAccess<'_> {
    fn drop(&mut self) {
        self.gate.release_read();
    }
}

impl Drop for WriteAccess<'_> {
    fn drop(&mut self) {
        self.gate.release_write();
    }
}
