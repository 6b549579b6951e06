use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::errors::ReviewError;

/// Ensures only one git metadata operation runs at a time against a shared
/// repository. Working copies created under the permit are independent.
pub struct GitSemaphore {
    semaphore: Arc<Semaphore>,
}

impl GitSemaphore {
    pub fn new() -> Self {
        Self { semaphore: Arc::new(Semaphore::new(1)) }
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, ReviewError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| ReviewError::Internal("Git semaphore closed".into()))
    }
}

impl Default for GitSemaphore {
    fn default() -> Self {
        Self::new()
    }
}
