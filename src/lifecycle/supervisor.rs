//! Listener supervision.
//!
//! # Responsibilities
//! - Own every listener task
//! - Couple their lifetimes: the first unexpected exit stops all of them
//! - Bound the drain after shutdown by a grace period, then abort
//!
//! # Design Decisions
//! - A listener returning `Ok` before shutdown is a failure: every route is
//!   required for the proxy to be useful
//! - Exceeding the grace period is logged, not an error

use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::lifecycle::shutdown::Shutdown;

type ListenerResult = (u16, io::Result<()>);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("listener on port {port} stopped unexpectedly")]
    UnexpectedExit { port: u16 },

    #[error("listener on port {port} failed: {source}")]
    Failed {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("listener task aborted: {0}")]
    Join(#[from] JoinError),
}

pub struct Supervisor {
    shutdown: Shutdown,
    tasks: JoinSet<ListenerResult>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(shutdown: Shutdown, grace: Duration) -> Self {
        Self {
            shutdown,
            tasks: JoinSet::new(),
            grace,
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Run a listener's serve loop under supervision.
    pub fn spawn<F>(&mut self, port: u16, serve: F)
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (port, serve.await) });
    }

    /// Wait for shutdown or the first listener exit, then drain the rest.
    /// Returns the first failure, if any.
    pub async fn wait(mut self) -> Result<(), SupervisorError> {
        let mut failure = None;

        let stop = self.shutdown.wait();
        tokio::pin!(stop);

        tokio::select! {
            _ = &mut stop => {
                tracing::info!(listeners = self.tasks.len(), "Shutdown triggered, draining listeners");
            }
            Some(joined) = self.tasks.join_next() => {
                if let Some(err) = classify(joined, self.shutdown.is_triggered()) {
                    tracing::error!(error = %err, "Listener terminated, shutting down all listeners");
                    failure = Some(err);
                }
                self.shutdown.trigger();
            }
        }

        let drained =
            tokio::time::timeout(self.grace, drain(&mut self.tasks, &mut failure)).await;
        if drained.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                grace_secs = self.grace.as_secs_f64(),
                "Grace period elapsed, aborting remaining listeners"
            );
            self.tasks.shutdown().await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn drain(tasks: &mut JoinSet<ListenerResult>, failure: &mut Option<SupervisorError>) {
    while let Some(joined) = tasks.join_next().await {
        if let Some(err) = classify(joined, true) {
            tracing::warn!(error = %err, "Listener failed while draining");
            failure.get_or_insert(err);
        }
    }
}

fn classify(
    joined: Result<ListenerResult, JoinError>,
    stopping: bool,
) -> Option<SupervisorError> {
    match joined {
        Ok((port, Ok(()))) => {
            if stopping {
                tracing::debug!(listen_port = port, "Listener drained");
                None
            } else {
                Some(SupervisorError::UnexpectedExit { port })
            }
        }
        Ok((port, Err(source))) => Some(SupervisorError::Failed { port, source }),
        Err(e) if e.is_cancelled() => None,
        Err(e) => Some(SupervisorError::Join(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn until_shutdown(shutdown: &Shutdown, stopped: Arc<AtomicUsize>) -> impl Future<Output = io::Result<()>> {
        let wait = shutdown.wait();
        async move {
            wait.await;
            stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failure_stops_every_listener() {
        let shutdown = Shutdown::new();
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new(shutdown.clone(), Duration::from_secs(5));

        supervisor.spawn(8585, until_shutdown(&shutdown, stopped.clone()));
        supervisor.spawn(8586, until_shutdown(&shutdown, stopped.clone()));
        supervisor.spawn(8587, async {
            Err(io::Error::new(io::ErrorKind::Other, "accept loop died"))
        });

        let err = supervisor.wait().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Failed { port: 8587, .. }));
        assert!(shutdown.is_triggered());
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn early_clean_exit_is_a_failure() {
        let shutdown = Shutdown::new();
        let mut supervisor = Supervisor::new(shutdown.clone(), Duration::from_secs(5));
        supervisor.spawn(8585, async { Ok(()) });

        let err = supervisor.wait().await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnexpectedExit { port: 8585 }));
    }

    #[tokio::test]
    async fn triggered_shutdown_is_clean() {
        let shutdown = Shutdown::new();
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new(shutdown.clone(), Duration::from_secs(5));
        supervisor.spawn(8585, until_shutdown(&shutdown, stopped.clone()));

        shutdown.trigger();
        supervisor.wait().await.unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_listener_is_aborted_after_grace() {
        let shutdown = Shutdown::new();
        let mut supervisor = Supervisor::new(shutdown.clone(), Duration::from_secs(30));
        supervisor.spawn(8585, std::future::pending());

        shutdown.trigger();
        supervisor.wait().await.unwrap();
    }
}
