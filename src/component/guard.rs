use super::Component;
use crate::lifecycle::Message;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Scoped lock on a component; sends `Unlock` when dropped.
pub struct LockGuard {
    name: String,
    release: Option<Box<dyn FnOnce() -> bool + Send + Sync>>,
}

impl LockGuard {
    /// Wrap a lock that has already been acquired on `component`
    pub(crate) fn acquired<C: Component + ?Sized>(component: Arc<C>) -> Self {
        Self {
            name: component.name().to_string(),
            release: Some(Box::new(move || component.send(Message::Unlock))),
        }
    }

    /// Name of the locked component
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock now instead of at drop
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if let Some(release) = self.release.take() {
            if release() {
                trace!("Released lock on '{}'", self.name);
            } else {
                warn!("Unlock of '{}' was rejected", self.name);
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("held", &self.release.is_some())
            .finish()
    }
}
