//! Timeout and cancellation helpers.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ClassifiedError, SynclineError};

use super::clock::Clock;

/// Wrap a future with a timeout and an optional cancellation signal.
///
/// Expiry and cancellation both drop the inner future (aborting an in-flight
/// request) and surface as transport errors.
pub async fn with_timeout<T>(
    duration: Duration,
    cancel: Option<&CancellationToken>,
    future: impl Future<Output = Result<T, ClassifiedError>>,
) -> Result<T, ClassifiedError> {
    tokio::select! {
        biased;
        () = cancelled(cancel) => Err(cancelled_error()),
        result = tokio::time::timeout(duration, future) => match result {
            Ok(result) => result,
            Err(_) => Err(ClassifiedError::transport(format!(
                "request timed out after {}ms",
                duration.as_millis()
            ))),
        },
    }
}

/// Sleep on `clock`, returning early with a transport error if cancelled.
pub async fn interruptible_sleep(
    clock: &dyn Clock,
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), ClassifiedError> {
    tokio::select! {
        biased;
        () = cancelled(cancel) => Err(cancelled_error()),
        () = clock.sleep(duration) => Ok(()),
    }
}

/// Run `future` unless `cancel` fires first, in which case it is dropped.
pub async fn until_cancelled<T>(
    cancel: Option<&CancellationToken>,
    future: impl Future<Output = Result<T, SynclineError>>,
) -> Result<T, SynclineError> {
    tokio::select! {
        biased;
        () = cancelled(cancel) => Err(cancelled_error().into()),
        result = future => result,
    }
}

pub(crate) fn cancelled_error() -> ClassifiedError {
    ClassifiedError::transport("request cancelled")
}

async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::util::clock::SystemClock;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_transport_error() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), None, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert!(err.message.contains("50ms"));
    }

    #[tokio::test]
    async fn completed_future_passes_through() {
        let result = with_timeout(Duration::from_secs(1), None, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_future() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = with_timeout(Duration::from_secs(30), Some(&token), async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err(), cancelled_error());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interruptible() {
        let token = CancellationToken::new();
        token.cancel();

        let result = interruptible_sleep(&SystemClock, Duration::from_secs(60), Some(&token)).await;

        assert_eq!(result.unwrap_err(), cancelled_error());
    }

    #[tokio::test(start_paused = true)]
    async fn until_cancelled_drops_pending_work() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), SynclineError> = until_cancelled(Some(&token), async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err().classified(), Some(&cancelled_error()));
    }
}
