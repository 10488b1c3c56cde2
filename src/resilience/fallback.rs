//! # Fallback Chain
//!
//! Tries a primary operation, then each fallback in order, returning the
//! first success. When every operation fails the caller gets a single
//! [`ReliabilityError::FallbackExhausted`] listing each attempt.

use crate::error::{ErrorKind, ReliabilityError, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// One failed link of a fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackAttempt {
    /// `primary`, `fallback-1`, `fallback-2`, ...
    pub label: String,
    pub message: String,
    pub kind: ErrorKind,
}

pub type BoxedOperation<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a>;

/// Box a closure so operations of different types can share one chain
pub fn boxed_operation<'a, T, F, Fut>(operation: F) -> BoxedOperation<'a, T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<T>> + Send + 'a,
{
    Box::new(move || Box::pin(operation()))
}

pub struct FallbackChain<'a, T> {
    name: String,
    primary: Option<BoxedOperation<'a, T>>,
    fallbacks: Vec<BoxedOperation<'a, T>>,
}

impl<'a, T> FallbackChain<'a, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary: None,
            fallbacks: Vec::new(),
        }
    }

    /// First link, whenever it is registered; calling again replaces it
    pub fn primary<F, Fut>(mut self, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
    {
        self.primary = Some(boxed_operation(operation));
        self
    }

    pub fn fallback<F, Fut>(mut self, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
    {
        self.fallbacks.push(boxed_operation(operation));
        self
    }

    pub fn len(&self) -> usize {
        usize::from(self.primary.is_some()) + self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn execute(self) -> Result<T> {
        let Some(primary) = self.primary else {
            return Err(ReliabilityError::Configuration(format!(
                "fallback chain '{}' has no primary operation",
                self.name
            )));
        };

        let mut attempts = Vec::with_capacity(1 + self.fallbacks.len());
        let operations = std::iter::once(primary).chain(self.fallbacks);

        for (index, operation) in operations.enumerate() {
            let label = if index == 0 {
                "primary".to_string()
            } else {
                format!("fallback-{index}")
            };

            match operation().await {
                Ok(value) => {
                    if index > 0 {
                        info!(operation = %self.name, served_by = %label, "↩️ Served by fallback");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    debug!(operation = %self.name, attempt = %label, error = %error, "Fallback link failed");
                    attempts.push(FallbackAttempt {
                        label,
                        message: error.message(),
                        kind: error.kind(),
                    });
                }
            }
        }

        warn!(
            operation = %self.name,
            attempts = attempts.len(),
            "All fallback options failed"
        );
        Err(ReliabilityError::FallbackExhausted { attempts })
    }
}

impl<T> std::fmt::Debug for FallbackChain<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("name", &self.name)
            .field("has_primary", &self.primary.is_some())
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

/// Run `primary`, then `fallbacks` in order
pub async fn with_fallback<'a, T, F, Fut>(
    name: &str,
    primary: F,
    fallbacks: Vec<BoxedOperation<'a, T>>,
) -> Result<T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<T>> + Send + 'a,
{
    let mut chain = FallbackChain::new(name).primary(primary);
    chain.fallbacks.extend(fallbacks);
    chain.execute().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail(kind: ErrorKind, message: &str) -> ReliabilityError {
        ReliabilityError::operation(kind, message)
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallbacks() {
        let value = FallbackChain::new("pricing")
            .primary(|| async { Ok(10) })
            .fallback(|| async { Ok(99) })
            .execute()
            .await
            .unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_first_successful_fallback_wins() {
        let value = with_fallback(
            "pricing",
            || async { Err(fail(ErrorKind::ExternalApi, "supplier down")) },
            vec![
                boxed_operation(|| async { Err(fail(ErrorKind::Network, "cache miss")) }),
                boxed_operation(|| async { Ok(42) }),
                boxed_operation(|| async { Ok(99) }),
            ],
        )
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_exhaustion_lists_every_attempt() {
        let result: Result<u32> = FallbackChain::new("estimate")
            .primary(|| async { Err(fail(ErrorKind::AiModel, "model overloaded")) })
            .fallback(|| async { Err(fail(ErrorKind::Timeout, "rules engine slow")) })
            .execute()
            .await;

        match result {
            Err(ReliabilityError::FallbackExhausted { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].label, "primary");
                assert_eq!(attempts[0].kind, ErrorKind::AiModel);
                assert_eq!(attempts[1].label, "fallback-1");
                assert_eq!(attempts[1].message, "rules engine slow");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_configuration_error() {
        let result: Result<()> = FallbackChain::new("empty").execute().await;
        assert!(matches!(result, Err(ReliabilityError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_primary_registered_after_fallback_keeps_both() {
        let chain = FallbackChain::new("pricing")
            .fallback(|| async { Ok(7) })
            .primary(|| async { Err(fail(ErrorKind::ExternalApi, "supplier down")) });
        assert_eq!(chain.len(), 2);

        assert_eq!(chain.execute().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_fallbacks_without_primary_are_rejected() {
        let result: Result<u32> = FallbackChain::new("pricing")
            .fallback(|| async { Ok(7) })
            .execute()
            .await;
        assert!(matches!(result, Err(ReliabilityError::Configuration(_))));
    }
}
