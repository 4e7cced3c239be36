//! Cross-thread state shared by a pipeline and its owner
//!
//! Worker threads never throw across the thread boundary. They park the
//! first failure in an [`ErrorSlot`] and the owning thread re-raises it at
//! its next blocking call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::error::GzpipeError;

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Guarded values are plain data that is never left half-updated.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// First error wins; later errors are dropped.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    error: Mutex<Option<GzpipeError>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` unless a previous error is already recorded. Returns
    /// whether this call stored it.
    pub fn record(&self, err: GzpipeError) -> bool {
        let mut slot = lock(&self.error);
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    pub fn get(&self) -> Option<GzpipeError> {
        lock(&self.error).clone()
    }

    pub fn take(&self) -> Option<GzpipeError> {
        lock(&self.error).take()
    }

    pub fn is_set(&self) -> bool {
        lock(&self.error).is_some()
    }
}

/// How far the sequencer has got, plus the cancellation flag every pipeline
/// thread checks before doing more work.
#[derive(Debug, Default)]
pub struct Progress {
    sequenced: Mutex<u64>,
    changed: Condvar,
    cancelled: AtomicBool,
    errors: ErrorSlot,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the first `sequenced` pipeline entries reached the sink.
    pub fn advance(&self, sequenced: u64) {
        let mut guard = lock(&self.sequenced);
        *guard = sequenced;
        self.changed.notify_all();
    }

    /// Capture a worker failure and stop the pipeline.
    pub fn fail(&self, err: GzpipeError) {
        tracing::debug!(error = %err, "pipeline failure");
        self.errors.record(err);
        self.cancel();
    }

    /// Stop the pipeline without an error and wake every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // Notify under the lock so a waiter between its flag check and its
        // wait cannot miss the wakeup.
        let _guard = lock(&self.sequenced);
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn take_error(&self) -> Option<GzpipeError> {
        self.errors.take()
    }

    pub fn has_error(&self) -> bool {
        self.errors.is_set()
    }

    /// Block until at least `target` entries are sequenced. Returns false if
    /// the pipeline was cancelled first.
    pub fn wait_for(&self, target: u64) -> bool {
        let mut guard = lock(&self.sequenced);
        loop {
            if *guard >= target {
                return true;
            }
            if self.is_cancelled() {
                return false;
            }
            guard = self
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Somewhere a pipeline thread can leave its failure for the owner.
pub trait FailureSink {
    fn record_failure(&self, err: GzpipeError);
}

impl FailureSink for ErrorSlot {
    fn record_failure(&self, err: GzpipeError) {
        self.record(err);
    }
}

impl FailureSink for Progress {
    fn record_failure(&self, err: GzpipeError) {
        self.fail(err);
    }
}

/// Turns a panic on a pipeline thread into a recorded error, so the owner
/// wakes up instead of waiting for a thread that no longer exists.
pub struct PanicGuard<'a, S: FailureSink> {
    sink: &'a S,
    role: &'static str,
}

impl<'a, S: FailureSink> PanicGuard<'a, S> {
    pub fn new(sink: &'a S, role: &'static str) -> Self {
        Self { sink, role }
    }
}

impl<S: FailureSink> Drop for PanicGuard<'_, S> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.sink
                .record_failure(GzpipeError::thread(format!("{} panicked", self.role)));
        }
    }
}
