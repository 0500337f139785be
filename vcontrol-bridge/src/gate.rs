//! Exclusive execution gate for vclient invocations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Why the gate could not be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("timed out after {0:?} waiting for the previous vclient invocation")]
    Timeout(Duration),
    #[error("cancelled while waiting for the execution gate")]
    Cancelled,
}

/// Binary semaphore with a bounded wait.
///
/// At most one [`GatePermit`] exists at a time. The permit releases the gate
/// when dropped, so every exit path of the holder releases it.
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

/// Proof of exclusive access; dropping it opens the gate.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            timeout,
        }
    }

    /// Longest time [`acquire`](Self::acquire) waits.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True when nobody holds the gate.
    pub fn is_open(&self) -> bool {
        self.semaphore.available_permits() == 1
    }

    /// Enter the gate, waiting at most the configured timeout.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit, GateError> {
        if cancel.is_cancelled() {
            return Err(GateError::Cancelled);
        }

        let acquire = tokio::time::timeout(self.timeout, self.semaphore.clone().acquire_owned());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateError::Cancelled),
            result = acquire => match result {
                Ok(Ok(permit)) => Ok(GatePermit { _permit: permit }),
                // The semaphore is never closed; treat it like a timeout anyway.
                Ok(Err(_)) | Err(_) => Err(GateError::Timeout(self.timeout)),
            },
        }
    }
}
