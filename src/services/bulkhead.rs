//! Per-provider bulkhead isolation.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::errors::{GatewayError, GatewayResult};

/// Caps concurrent logical calls to one provider. Never queues.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    provider: String,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Bulkhead {
    pub fn new(provider: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            provider: provider.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Take a slot or fail with `BulkheadFull`. The slot is released when the
    /// permit is dropped.
    pub fn try_enter(&self) -> GatewayResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| {
                tracing::debug!(provider = %self.provider, max_concurrent = self.max_concurrent, "Bulkhead full");
                GatewayError::BulkheadFull {
                    provider: self.provider.clone(),
                    max_concurrent: self.max_concurrent,
                }
            })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_when_full_and_recovers() {
        let bulkhead = Bulkhead::new("alpha", 2);
        let first = bulkhead.try_enter().unwrap();
        let _second = bulkhead.try_enter().unwrap();

        let err = bulkhead.try_enter().unwrap_err();
        assert!(matches!(
            err,
            GatewayError::BulkheadFull {
                max_concurrent: 2,
                ..
            }
        ));

        drop(first);
        assert_eq!(bulkhead.available(), 1);
        assert!(bulkhead.try_enter().is_ok());
    }
}
