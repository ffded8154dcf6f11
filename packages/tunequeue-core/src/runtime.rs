//! Background task spawning.
//!
//! Services never call `tokio::spawn` directly. They hold a [`TaskSpawner`],
//! which keeps command handling and history writes testable and lets the
//! binary decide which runtime owns the work.

use std::future::Future;

/// Spawns fire-and-forget background work.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future that runs to completion independently of the caller.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Spawner backed by a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Uses the handle of the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn spawned_task_runs() {
        let spawner = TokioSpawner::current();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        spawner.spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
