use log::debug;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::client_defaults::{
    CANCEL_CHECK_SLICE, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS, DEFAULT_POLL_TIMEOUT,
};
use crate::error::Error;
use crate::models::{Operation, OperationStatus};

/// Bounds for waiting on an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Sleep between two status queries.
    pub interval: Duration,
    /// Maximum number of status queries.
    pub max_attempts: u32,
    /// Overall wall-clock bound.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Queries `check` until the operation reaches a terminal state.
///
/// `Succeeded` returns the final status document, `Failed` becomes
/// `Error::OperationFailed`, exceeding either bound becomes `Error::Timeout`
/// and a cancelled token becomes `Error::Cancelled`.
pub(crate) fn poll_until_complete<F>(
    operation_id: &str,
    options: &PollOptions,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<Operation, Error>
where
    F: FnMut() -> Result<Operation, Error>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(operation_id));
        }
        attempts += 1;
        let operation = check()?;
        debug!(
            "operation {operation_id}: attempt {attempts} status {}",
            operation.status
        );
        match operation.status() {
            OperationStatus::Succeeded => return Ok(operation),
            OperationStatus::Failed => {
                return Err(Error::OperationFailed {
                    operation_id: operation_id.to_string(),
                    error: operation.failure(),
                })
            }
            OperationStatus::InProgress => {}
        }

        let elapsed = started.elapsed();
        if attempts >= options.max_attempts || elapsed >= options.timeout {
            return Err(Error::Timeout {
                operation_id: operation_id.to_string(),
                waited: elapsed,
            });
        }
        let pause = options.interval.min(options.timeout - elapsed);
        if sleep_unless_cancelled(pause, cancel) {
            return Err(cancelled(operation_id));
        }
    }
}

/// Returns true when the token fired before `duration` elapsed.
fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        thread::sleep(remaining.min(CANCEL_CHECK_SLICE));
    }
}

fn cancelled(operation_id: &str) -> Error {
    Error::Cancelled {
        operation_id: Some(operation_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{poll_until_complete, PollOptions};
    use crate::error::{ApiError, Error};
    use crate::models::Operation;
    use std::cell::Cell;
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn operation(status: &str) -> Operation {
        Operation {
            id: "op-1".to_string(),
            status: status.to_string(),
            http_status_code: None,
            error: None,
        }
    }

    fn fast_options(max_attempts: u32) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(1),
            max_attempts,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn returns_after_success() {
        let calls = Cell::new(0);
        let result = poll_until_complete("op-1", &fast_options(10), &CancellationToken::new(), || {
            calls.set(calls.get() + 1);
            Ok(operation(if calls.get() < 3 { "InProgress" } else { "Succeeded" }))
        })
        .expect("succeeded");
        assert_eq!(result.status, "Succeeded");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn failed_operation_carries_provider_reason() {
        let err = poll_until_complete("op-9", &fast_options(10), &CancellationToken::new(), || {
            let mut op = operation("Failed");
            op.http_status_code = Some(409);
            op.error = Some(ApiError {
                code: "ConflictError".to_string(),
                message: "role is busy".to_string(),
                ..ApiError::default()
            });
            Ok(op)
        })
        .expect_err("failed");
        match err {
            Error::OperationFailed {
                operation_id,
                error,
            } => {
                assert_eq!(operation_id, "op-9");
                assert_eq!(error.status, 409);
                assert_eq!(error.code, "ConflictError");
                assert_eq!(error.message, "role is busy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn exceeding_attempts_is_timeout_not_failure() {
        let calls = Cell::new(0);
        let err = poll_until_complete("op-2", &fast_options(4), &CancellationToken::new(), || {
            calls.set(calls.get() + 1);
            Ok(operation("InProgress"))
        })
        .expect_err("timeout");
        assert!(matches!(err, Error::Timeout { ref operation_id, .. } if operation_id == "op-2"));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn exceeding_wall_clock_is_timeout() {
        let options = PollOptions {
            interval: Duration::from_millis(20),
            max_attempts: u32::MAX,
            timeout: Duration::from_millis(60),
        };
        let err = poll_until_complete("op-3", &options, &CancellationToken::new(), || {
            Ok(operation("InProgress"))
        })
        .expect_err("timeout");
        match err {
            Error::Timeout { waited, .. } => assert!(waited >= Duration::from_millis(60)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancellation_interrupts_sleep() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });
        let options = PollOptions {
            interval: Duration::from_secs(30),
            max_attempts: 10,
            timeout: Duration::from_secs(60),
        };
        let started = Instant::now();
        let err = poll_until_complete("op-4", &options, &token, || Ok(operation("InProgress")))
            .expect_err("cancelled");
        assert!(matches!(
            err,
            Error::Cancelled { operation_id: Some(ref id) } if id == "op-4"
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().expect("canceller");
    }

    #[test]
    fn cancelled_token_skips_status_query() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Cell::new(0);
        let err = poll_until_complete("op-6", &fast_options(3), &token, || {
            calls.set(calls.get() + 1);
            Ok(operation("Succeeded"))
        })
        .expect_err("cancelled");
        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn status_query_errors_propagate() {
        let err = poll_until_complete("op-5", &fast_options(3), &CancellationToken::new(), || {
            Err(Error::InvalidArgument("boom".to_string()))
        })
        .expect_err("error");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
