use anyhow::{anyhow, Result};
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Named background tasks of one gateway plus the flag that stops them.
pub struct ServiceHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl Default for ServiceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHandle {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx, tasks: Vec::new() }
    }

    /// Receiver that flips to `true` once `shutdown` is called.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn `task`; `shutdown` waits for it. A failure is logged as soon
    /// as the task ends.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let h = tokio::spawn(async move {
            let res = task.await;
            if let Err(e) = &res {
                error!("task {} failed: {:?}", name, e);
            }
            res
        });
        self.tasks.push((name, h));
    }

    /// True while at least one task has not finished.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|(_, h)| !h.is_finished())
    }

    /// Raise the flag and join every task. The first task failure is
    /// returned after all tasks are joined.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx.send_replace(true);
        let mut first_err = None;
        for (name, h) in self.tasks {
            match h.await {
                Ok(Ok(())) => debug!("task {} finished", name),
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    error!("task {} panicked or was cancelled: {}", name, e);
                    first_err.get_or_insert(anyhow!("task {} did not complete: {}", name, e));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_reaches_spawned_tasks() {
        let mut handle = ServiceHandle::new();
        let mut rx = handle.shutdown_rx();
        handle.spawn("waiter", async move {
            rx.wait_for(|stop| *stop).await?;
            Ok::<(), anyhow::Error>(())
        });
        assert!(handle.is_running());
        tokio_test::assert_ok!(handle.shutdown().await);
    }

    #[tokio::test]
    async fn failing_task_is_reported_after_the_rest_finish() {
        let mut handle = ServiceHandle::new();
        handle.spawn("broken", async { Err::<(), _>(anyhow::anyhow!("bind lost")) });
        let mut rx = handle.shutdown_rx();
        handle.spawn("waiter", async move {
            rx.wait_for(|stop| *stop).await?;
            Ok::<(), anyhow::Error>(())
        });
        let err = tokio_test::assert_err!(handle.shutdown().await);
        assert!(err.to_string().contains("bind lost"));
    }
}
