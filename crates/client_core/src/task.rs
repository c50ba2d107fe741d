use std::future::Future;

use tokio::task::JoinHandle;

/// Owns a spawned background task and aborts it when dropped.
pub struct TaskGuard {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            handle: Some(tokio::spawn(future)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(task = self.name, "cancelled background task");
            handle.abort();
        }
    }

    /// Releases ownership without aborting. Used when the task itself is the
    /// one tearing down its owner and is about to return anyway.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
