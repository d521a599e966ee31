//! Bounded polling.
//!
//! Every wait in the harness is a loop of: evaluate predicate, sleep a
//! fixed interval, retry, until an overall deadline. Transient errors
//! from the predicate are swallowed and retried; any other error ends the
//! wait immediately.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::errors::{HarnessError, HarnessResult};
use crate::observability::Logger;

/// Interval and deadline of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl WaitConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_millis(interval_ms: u64, timeout_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    /// Same interval, different deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// Poll `predicate` until it returns `Ok(true)`.
///
/// `what` names the condition in the timeout error and in trace logs.
/// The predicate runs at least once even with a zero timeout.
pub fn wait_until<F>(what: &str, config: &WaitConfig, mut predicate: F) -> HarnessResult<()>
where
    F: FnMut() -> HarnessResult<bool>,
{
    let start = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        match predicate() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) if err.is_transient() => {
                Logger::trace(
                    "WAIT_TRANSIENT_ERROR",
                    &[("condition", what), ("error", &err.message)],
                );
            }
            Err(err) => return Err(err),
        }

        if start.elapsed() >= config.timeout {
            return Err(HarnessError::timeout(format!(
                "timed out after {}ms ({} attempts) waiting for {}",
                config.timeout.as_millis(),
                attempts,
                what
            )));
        }

        thread::sleep(config.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::errors::HarnessErrorKind;
    use crate::node::CommandError;

    fn fast() -> WaitConfig {
        WaitConfig::from_millis(1, 200)
    }

    #[test]
    fn test_returns_when_predicate_holds() {
        let mut calls = 0;
        let result = wait_until("third call", &fast(), || {
            calls += 1;
            Ok(calls == 3)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_times_out() {
        let config = WaitConfig::from_millis(1, 10);
        let err = wait_until("never", &config, || Ok(false)).unwrap_err();
        assert_eq!(err.kind, HarnessErrorKind::Timeout);
        assert!(err.message.contains("never"));
    }

    #[test]
    fn test_retries_transient_errors() {
        let mut calls = 0;
        let result = wait_until("flaky", &fast(), || {
            calls += 1;
            if calls < 3 {
                Err(HarnessError::from_command(CommandError::network("h:1", "reset")))
            } else {
                Ok(true)
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_fatal_error_stops_immediately() {
        let mut calls = 0;
        let err = wait_until("broken", &fast(), || {
            calls += 1;
            Err(HarnessError::from_command(CommandError::UnrecoverableRollback(
                "lost history".into(),
            )))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(err.is_unrecoverable_rollback());
    }

    #[test]
    fn test_zero_timeout_still_evaluates_once() {
        let config = WaitConfig::from_millis(1, 0);
        assert!(wait_until("immediate", &config, || Ok(true)).is_ok());
    }
}
