//! Guaranteed-finalizer scope around a pipeline run.

use std::future::Future;
use tokio::signal::unix::{SignalKind, signal};
use tracing::warn;

use super::ResourceRegistry;
use crate::core::{AppupError, EXIT_FAILURE, exit_code_for};

/// Wait for SIGINT, SIGTERM or SIGHUP and describe it as an
/// [`AppupError::Interrupted`].
pub async fn shutdown_signal() -> std::io::Result<AppupError> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let (name, code) = tokio::select! {
        _ = interrupt.recv() => ("SIGINT", 130),
        _ = terminate.recv() => ("SIGTERM", 143),
        _ = hangup.recv() => ("SIGHUP", 129),
    };
    Ok(AppupError::Interrupted {
        signal: name.to_string(),
        code,
    })
}

/// Runs work inside a scope that always reconciles the registry.
///
/// [`CleanupScope::run`] races the work against termination signals. Whichever
/// finishes first decides the exit code, and the registry is reconciled with
/// it before `run` returns. If the scope is dropped without `run` completing
/// (a panic, or the caller's future being cancelled), `Drop` reconciles with a
/// failure code instead.
pub struct CleanupScope {
    registry: ResourceRegistry,
    finished: bool,
}

impl CleanupScope {
    /// Enter the scope and mark the registry as running.
    pub fn enter(registry: ResourceRegistry) -> Self {
        registry.begin();
        Self {
            registry,
            finished: false,
        }
    }

    /// Run `work` to completion or until a termination signal arrives, then
    /// reconcile.
    ///
    /// The returned result is the work's own result, or
    /// [`AppupError::Interrupted`] if a signal won the race. The in-flight step
    /// is dropped in that case; partially written files stay on disk for the
    /// next run.
    pub async fn run<T, F>(mut self, work: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let interrupted = async {
            match shutdown_signal().await {
                Ok(err) => err,
                Err(e) => {
                    warn!("Signal handlers unavailable: {}", e);
                    std::future::pending().await
                }
            }
        };

        let result = tokio::select! {
            result = work => result,
            err = interrupted => {
                warn!("{}, cleaning up", err);
                Err(anyhow::Error::from(err))
            }
        };

        let code = match &result {
            Ok(_) => 0,
            Err(e) => exit_code_for(e),
        };
        self.finish(code);
        result
    }

    /// Reconcile now with `exit_code`.
    pub fn finish(&mut self, exit_code: i32) -> i32 {
        self.finished = true;
        self.registry.reconcile(exit_code)
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        if !self.finished {
            self.registry.reconcile(EXIT_FAILURE);
        }
    }
}
