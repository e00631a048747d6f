//! Admission lock serializing TCC attempts.

use std::sync::Arc;

use async_trait::async_trait;
use common::ErrorKind;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Error type for lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock is held and the caller asked not to wait.
    #[error("lock is held by another attempt")]
    WouldBlock,
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Proof of admission. Dropping it releases the lock.
pub struct AdmissionGuard {
    _release: Box<dyn Send + Sync>,
}

impl AdmissionGuard {
    /// Wraps anything whose drop releases the underlying lock.
    pub fn new<T: Send + Sync + 'static>(release: T) -> Self {
        Self {
            _release: Box::new(release),
        }
    }
}

impl std::fmt::Debug for AdmissionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGuard").finish_non_exhaustive()
    }
}

/// Single-flight admission for order creation attempts.
///
/// Implementations may be process-local or distributed; the coordinator only
/// relies on at most one guard existing at a time.
#[async_trait]
pub trait AdmissionLock: Send + Sync {
    /// Waits until the lock is free and takes it.
    async fn acquire(&self) -> Result<AdmissionGuard, LockError>;

    /// Takes the lock if it is free.
    fn try_acquire(&self) -> Result<AdmissionGuard, LockError>;
}

/// Process-wide admission lock backed by a tokio mutex.
///
/// Clones share the same mutex.
#[derive(Debug, Clone, Default)]
pub struct ProcessLock {
    inner: Arc<Mutex<()>>,
}

impl ProcessLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while some guard is alive.
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

fn guard(owned: OwnedMutexGuard<()>) -> AdmissionGuard {
    AdmissionGuard::new(owned)
}

#[async_trait]
impl AdmissionLock for ProcessLock {
    async fn acquire(&self) -> Result<AdmissionGuard, LockError> {
        Ok(guard(Arc::clone(&self.inner).lock_owned().await))
    }

    fn try_acquire(&self) -> Result<AdmissionGuard, LockError> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map(guard)
            .map_err(|_| LockError::WouldBlock)
    }
}
