//! # Timeout Guard
//!
//! Races an operation against a deadline. The operation runs on its own task
//! so that a timed-out caller only stops waiting: the task is detached and
//! keeps running to completion. Operations passed here must be idempotent.

use crate::error::{ReliabilityError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub async fn with_timeout<Fut, T>(name: &str, timeout: Duration, operation: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(operation);

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ReliabilityError::TaskJoin(format!(
            "operation '{name}' failed to complete: {join_error}"
        ))),
        Err(_) => {
            warn!(
                operation = name,
                timeout_ms = timeout.as_millis() as u64,
                "⏱️ Operation timed out, continuing detached"
            );
            Err(ReliabilityError::Timeout {
                operation: name.to_string(),
                timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let value = with_timeout("fast", Duration::from_secs(1), async { Ok(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_operation_error_passes_through() {
        let result: Result<()> = with_timeout("failing", Duration::from_secs(1), async {
            Err(ReliabilityError::operation(ErrorKind::Database, "deadlock"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Database);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches_without_cancelling() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let result = with_timeout("slow", Duration::from_millis(100), async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        match result {
            Err(ReliabilityError::Timeout { operation, timeout }) => {
                assert_eq!(operation, "slow");
                assert_eq!(timeout, Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
