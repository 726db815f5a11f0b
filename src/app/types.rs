use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Why a host began shutting down
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    /// The root component failed while running
    ComponentFailed(String),
    /// The root component was stopped by someone other than the host
    ComponentStopped,
}

/// Cloneable handle that asks a running host to shut down
#[derive(Clone)]
pub struct ShutdownHandle {
    pub(super) sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownHandle {
    /// Request shutdown; returns false if shutdown was already requested
    pub async fn request(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
