//! Shared scheduler for channel frame tasks and consumer dispatch tasks.
//!
//! A [`Task`] does a bounded amount of work each time it is run and reports whether it is
//! done. The [`WorkService`] keeps re-running it on the tokio runtime, yielding between turns,
//! so no task pins a worker thread and many channels and consumers progress side by side.
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::{runtime::Handle, task::yield_now};
use tracing::debug;

use crate::{error::Error, Result};

/// A re-schedulable unit of work.
#[async_trait]
pub trait Task: Send + 'static {
    /// Run one turn. Return `true` when the task is finished and can be dropped,
    /// `false` to be run again later.
    async fn run(&mut self) -> bool;
}

struct WorkServiceInner {
    handle: Handle,
    accepting: AtomicBool,
    running: AtomicUsize,
}

/// Clonable handle to the shared work scheduler.
#[derive(Clone)]
pub struct WorkService {
    inner: Arc<WorkServiceInner>,
}

impl WorkService {
    /// Scheduler bound to the runtime of the caller.
    ///
    /// Fails with [`Error::IllegalState`] outside a tokio runtime.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|err| Error::IllegalState(format!("no tokio runtime: {}", err)))?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            inner: Arc::new(WorkServiceInner {
                handle,
                accepting: AtomicBool::new(true),
                running: AtomicUsize::new(0),
            }),
        }
    }

    /// Schedule `task` until it reports completion.
    pub fn submit<T: Task>(&self, mut task: T) -> Result<()> {
        if !self.is_accepting() {
            return Err(Error::IllegalState(
                "work service no longer accepts tasks".to_string(),
            ));
        }
        let inner = self.inner.clone();
        inner.running.fetch_add(1, Ordering::AcqRel);
        self.inner.handle.spawn(async move {
            while !task.run().await {
                yield_now().await;
            }
            inner.running.fetch_sub(1, Ordering::AcqRel);
        });
        Ok(())
    }

    /// Stop accepting new tasks. Tasks already scheduled run to completion.
    pub fn shutdown(&self) {
        if self.inner.accepting.swap(false, Ordering::AcqRel) {
            debug!("work service stops accepting tasks");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Number of tasks scheduled and not yet finished.
    pub fn running_tasks(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::{sync::mpsc, time};
    use tracing::trace;

    use super::{Task, WorkService};

    struct Countdown {
        left: usize,
        turns_tx: mpsc::UnboundedSender<usize>,
    }

    #[async_trait]
    impl Task for Countdown {
        async fn run(&mut self) -> bool {
            trace!("countdown turn, {} left", self.left);
            self.turns_tx.send(self.left).unwrap();
            self.left -= 1;
            self.left == 0
        }
    }

    #[tokio::test]
    async fn test_task_rescheduled_until_done() {
        let work_service = WorkService::new().unwrap();
        let (turns_tx, mut turns_rx) = mpsc::unbounded_channel();
        work_service
            .submit(Countdown { left: 3, turns_tx })
            .unwrap();

        for expected in [3, 2, 1] {
            assert_eq!(Some(expected), turns_rx.recv().await);
        }
        // task is dropped after reporting completion
        assert_eq!(None, turns_rx.recv().await);

        time::timeout(Duration::from_secs(1), async {
            while work_service.running_tasks() != 0 {
                time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let work_service = WorkService::new().unwrap();
        work_service.shutdown();
        assert!(!work_service.is_accepting());

        let (turns_tx, _turns_rx) = mpsc::unbounded_channel();
        assert!(work_service
            .submit(Countdown { left: 1, turns_tx })
            .is_err());
    }
}
