//! Concurrent process runner for the collector's long-running loops.
//!
//! The collector is a set of independent loops (accept loops, the liveness
//! sweep, the closed-period watch, report schedules) that must all stop on
//! SIGTERM/SIGINT. The runner spawns each loop as a process sharing one
//! [`CancellationToken`]; the first process failure cancels the rest.
//!
//! # Example
//!
//! ```no_run
//! use gatecount_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_process(|ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("working");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .run()
//!         .await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type ProcessFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;
type Process = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;

/// Runs a set of cancel-aware processes until completion or shutdown.
pub struct Runner {
    processes: Vec<Process>,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds a process. Processes run concurrently; a process returning an
    /// error cancels every other process.
    pub fn with_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.processes.push(Box::new(|token| Box::pin(process(token))));
        self
    }

    /// Uses an externally owned cancellation token instead of a fresh one.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// The token handed to every process.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Runs all processes to completion, cancelling everything on
    /// SIGTERM/SIGINT or on the first process error. Returns the first
    /// process error, if any.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for process in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move { process(process_token).await });
        }

        let signal_token = token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received shutdown signal");
                    signal_token.cancel();
                }
                Err(err) => {
                    error!(error = %err, "failed to install ctrl-c handler");
                }
            }
        });

        #[cfg(unix)]
        {
            let sigterm_token = token.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        info!("received SIGTERM");
                        sigterm_token.cancel();
                    }
                    Err(err) => {
                        error!(error = %err, "failed to install SIGTERM handler");
                    }
                }
            });
        }

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(())) => {
                    debug!("process completed");
                }
                Ok(Err(err)) => {
                    if !token.is_cancelled() {
                        error!(error = %err, "process failed, shutting down");
                        token.cancel();
                    }
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(err) => {
                    if !token.is_cancelled() {
                        error!(error = %err, "process panicked, shutting down");
                        token.cancel();
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
