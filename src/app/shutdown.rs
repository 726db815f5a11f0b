use super::Host;
use crate::component::{Component, ComponentExt};
use crate::error::Result;
use crate::lifecycle::StateKind;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl<C: Component + ?Sized> Host<C> {
    /// Stop the root component within the configured stop timeout.
    ///
    /// Returns 0 when the component ends up stopped, 1 otherwise.
    pub async fn shutdown(&self) -> Result<i32> {
        info!("Beginning graceful shutdown of '{}'", self.component.name());

        // Our own stop must not be reported as an unrequested one
        self.cancellation_token.cancel();

        let state = self.component.state();
        let exit_code = match state.kind() {
            StateKind::Stopped | StateKind::Frozen => {
                info!("Root component '{}' already stopped", self.component.name());
                0
            }
            StateKind::Failed => {
                error!("Root component '{}' has failed: {}", self.component.name(), state);
                1
            }
            StateKind::Locked => {
                error!(
                    "Root component '{}' is still locked by {} holder(s), not stopping",
                    self.component.name(),
                    state.level()
                );
                1
            }
            StateKind::Starting => {
                error!(
                    "Root component '{}' is still starting and cannot be stopped",
                    self.component.name()
                );
                1
            }
            StateKind::Started => self.stop_with_timeout(true).await,
            StateKind::Stopping => self.stop_with_timeout(false).await,
        };

        if exit_code == 0 {
            info!("Graceful shutdown completed");
        } else {
            warn!("Shutdown completed with errors");
        }

        Ok(exit_code)
    }

    async fn stop_with_timeout(&self, send_stop: bool) -> i32 {
        let stopping = async {
            if send_stop {
                self.component.stop().await
            } else {
                self.component.when_stopped().await
            }
        };

        match timeout(self.config.stop_timeout(), stopping).await {
            Ok(Ok(())) => {
                info!("Root component '{}' stopped", self.component.name());
                0
            }
            Ok(Err(e)) => {
                error!("Error stopping root component '{}': {}", self.component.name(), e);
                1
            }
            Err(_) => {
                error!(
                    "Root component '{}' stop timeout after {}s",
                    self.component.name(),
                    self.config.stop_timeout_secs
                );
                1
            }
        }
    }
}
