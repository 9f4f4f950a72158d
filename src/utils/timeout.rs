use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::{NotifierError, Result};

/// Execute a future with a bounded wait.
///
/// Elapsing is reported as [`NotifierError::Timeout`] so callers can treat it
/// like any other transient transport failure.
pub async fn with_timeout<F, T>(future: F, duration: Duration, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            debug!("Operation '{}' timed out after {:?}", operation_name, duration);
            Err(NotifierError::Timeout {
                operation: operation_name.to_string(),
                elapsed: duration,
            })
        }
    }
}

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns `true` when the sleep completed and `false` when the caller should
/// stop. A dropped shutdown sender counts as a shutdown.
pub async fn sleep_unless_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow(),
            Err(_) => false,
        },
    }
}

/// Resolves once shutdown has been signalled (or the sender is gone).
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_operation() {
        async fn quick_operation() -> Result<String> {
            Ok("success".to_string())
        }

        let result = with_timeout(quick_operation(), Duration::from_secs(1), "test_operation").await;

        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        async fn slow_operation() -> Result<String> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok("success".to_string())
        }

        let result =
            with_timeout(slow_operation(), Duration::from_millis(100), "test_operation").await;

        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_shutdown() {
        let (tx, mut rx) = watch::channel(false);

        let sleeper = tokio::spawn(async move {
            sleep_unless_shutdown(Duration::from_secs(60), &mut rx).await
        });

        tx.send(true).unwrap();
        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(sleep_unless_shutdown(Duration::from_millis(10), &mut rx).await);
    }
}
