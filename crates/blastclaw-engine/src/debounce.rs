//! Single cancellable trailing-edge timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A debounce timer: scheduling always cancels and replaces any pending
/// task, so only the trailing edge of a burst fires, exactly once per
/// quiet period.
pub struct DebounceTimer {
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Run `action` after `delay`, unless another `schedule` call lands
    /// first.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Drop any pending task without firing it.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
