//! Process-wide crawl status with an exclusive start guard.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Stopping => write!(f, "stopping"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: RunState,
    token: CancellationToken,
}

/// Shared handle to the crawl status. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct RunControl {
    inner: Arc<Mutex<Inner>>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: RunState::Idle,
                token: CancellationToken::new(),
            })),
        }
    }
}

impl RunControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.lock().state
    }

    /// Move from `Idle` to `Running`. The returned guard carries a fresh
    /// cancellation token and resets the state to `Idle` when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::AlreadyRunning`] unless the state is `Idle`.
    pub fn try_start(&self) -> Result<RunGuard, ScraperError> {
        let mut inner = self.lock();
        if inner.state != RunState::Idle {
            return Err(ScraperError::AlreadyRunning(inner.state));
        }
        inner.state = RunState::Running;
        inner.token = CancellationToken::new();
        Ok(RunGuard {
            control: self.clone(),
            token: inner.token.clone(),
        })
    }

    /// Ask the active run to stop at its next checkpoint. Returns `false`
    /// when no run is active.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != RunState::Running {
            return false;
        }
        inner.state = RunState::Stopping;
        inner.token.cancel();
        true
    }
}

/// Exclusive right to run a crawl; see [`RunControl::try_start`].
#[derive(Debug)]
pub struct RunGuard {
    control: RunControl,
    token: CancellationToken,
}

impl RunGuard {
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.control.lock().state = RunState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_is_refused_while_running() {
        let control = RunControl::new();
        let guard = control.try_start().unwrap();
        assert_eq!(control.state(), RunState::Running);

        let second = control.try_start();
        assert!(
            matches!(second, Err(ScraperError::AlreadyRunning(RunState::Running))),
            "got: {second:?}"
        );

        drop(guard);
        assert_eq!(control.state(), RunState::Idle);
        assert!(control.try_start().is_ok());
    }

    #[test]
    fn stop_cancels_the_active_token() {
        let control = RunControl::new();
        let guard = control.try_start().unwrap();
        assert!(!guard.token().is_cancelled());

        assert!(control.request_stop());
        assert_eq!(control.state(), RunState::Stopping);
        assert!(guard.token().is_cancelled());
        assert!(matches!(
            control.try_start(),
            Err(ScraperError::AlreadyRunning(RunState::Stopping))
        ));
    }

    #[test]
    fn stop_without_a_run_is_a_no_op() {
        let control = RunControl::new();
        assert!(!control.request_stop());
        assert_eq!(control.state(), RunState::Idle);
    }

    #[test]
    fn each_run_gets_a_fresh_token() {
        let control = RunControl::new();
        let first = control.try_start().unwrap();
        control.request_stop();
        let old = first.token().clone();
        drop(first);

        let second = control.try_start().unwrap();
        assert!(old.is_cancelled());
        assert!(!second.token().is_cancelled());
    }
}
