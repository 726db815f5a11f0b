use super::types::{ShutdownHandle, ShutdownReason};
use crate::component::{Component, ComponentExt};
use crate::config::LifecycleConfig;
use crate::error::{LifelineError, Result};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs a root component for the lifetime of a process
pub struct Host<C: Component + ?Sized> {
    pub(super) component: Arc<C>,
    pub(super) config: LifecycleConfig,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl<C: Component + ?Sized> Host<C> {
    /// Create a host for `component` with the given timeouts
    pub fn new(component: Arc<C>, config: LifecycleConfig) -> Self {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            component,
            config,
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn component(&self) -> &Arc<C> {
        &self.component
    }

    /// Handle that can trigger shutdown from anywhere
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_sender),
        }
    }

    /// Start the root component, bounded by the configured start timeout
    pub async fn start(&self) -> Result<C::Output> {
        info!("Starting root component '{}'", self.component.name());

        match timeout(self.config.start_timeout(), self.component.start()).await {
            Ok(Ok(result)) => {
                info!("Root component '{}' started", self.component.name());
                Ok(result)
            }
            Ok(Err(e)) => {
                error!(
                    "Failed to start root component '{}': {}",
                    self.component.name(),
                    e
                );
                Err(e)
            }
            Err(_) => {
                error!(
                    "Root component '{}' start timeout",
                    self.component.name()
                );
                Err(LifelineError::Timeout {
                    expected: "Started",
                    seconds: self.config.start_timeout_secs,
                })
            }
        }
    }
}
