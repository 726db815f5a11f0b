use super::{Host, ShutdownHandle, ShutdownReason};
use crate::component::Component;
use crate::error::{LifelineError, Result};
use crate::lifecycle::{ComponentState, StateStream};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl<C: Component + ?Sized> Host<C> {
    /// Wait for a shutdown trigger, then stop the root component.
    ///
    /// Triggers are SIGINT, SIGTERM on unix, a [`ShutdownHandle`] request, or
    /// the root component failing or stopping on its own. Returns the exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Host for '{}' is running", self.component.name());

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| LifelineError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        let handle = self.shutdown_handle();
        setup_signal_handlers(handle.clone(), self.cancellation_token.clone());
        tokio::spawn(watch_component(
            self.component.subscribe(),
            handle,
            self.cancellation_token.clone(),
        ));

        let shutdown_reason = shutdown_receiver.await.map_err(|_| LifelineError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let mut exit_code = self.shutdown().await?;
        if let ShutdownReason::ComponentFailed(_) = shutdown_reason {
            exit_code = 1;
        }

        info!("Host for '{}' shutdown complete", self.component.name());
        Ok(exit_code)
    }
}

fn setup_signal_handlers(handle: ShutdownHandle, token: CancellationToken) {
    // Handle SIGTERM - Unix only
    #[cfg(unix)]
    {
        let handle = handle.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = token.cancelled() => {}
                Some(()) = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    handle.request(ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            Ok(()) = signal::ctrl_c() => {
                info!("Received SIGINT signal (Ctrl+C)");
                handle.request(ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        }
    });
}

/// Turn an unrequested stop or failure of the root component into a shutdown request
pub(super) async fn watch_component<T>(
    mut updates: StateStream<T>,
    handle: ShutdownHandle,
    token: CancellationToken,
) where
    T: Clone + Send + Sync + 'static,
{
    // The replayed state only matters if the root has already failed;
    // otherwise wait for a change after `run` began.
    let outcome = match updates.recv().await {
        Some(Ok(_)) => {
            updates
                .wait_for_with(ComponentState::is_idle, "Stopped", &token)
                .await
        }
        Some(Err(failure)) => Err(LifelineError::Failed(failure)),
        None => Err(LifelineError::StreamClosed { expected: "Stopped" }),
    };

    let reason = match outcome {
        Ok(_) => ShutdownReason::ComponentStopped,
        Err(LifelineError::Failed(failure)) => ShutdownReason::ComponentFailed(failure.to_string()),
        Err(LifelineError::Cancelled { .. }) => return,
        Err(e) => {
            warn!("Lost track of root component: {}", e);
            ShutdownReason::ComponentStopped
        }
    };

    warn!("Root component ended without a shutdown request: {:?}", reason);
    handle.request(reason).await;
}
