//! Cancellable background effect playback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a running effect-list playback task
///
/// Cancellation is cooperative: the worker checks the flag between
/// frames. Session cleanup is owned by the worker thread's guard, so it
/// runs whether the task completes, is cancelled, or panics.
pub struct EffectTask {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EffectTask {
    pub(crate) fn new(cancelled: Arc<AtomicBool>, handle: JoinHandle<()>) -> Self {
        Self {
            cancelled,
            handle: Some(handle),
        }
    }

    /// Ask the task to stop before its next frame
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Block until the task has exited
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Cancel and block until the task has exited
    pub fn cancel_and_wait(self) {
        self.cancel();
        self.wait();
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }
}
