use super::{Component, LockGuard};
use crate::error::{LifelineError, Result};
use crate::lifecycle::{ComponentState, Message, StateKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Standard operations derived from `send` and `subscribe`.
///
/// Implemented for `Arc<C>` so lock guards can keep the component alive.
#[async_trait]
pub trait ComponentExt: Send + Sync {
    type Output: Clone + Send + Sync + 'static;

    /// Start the component and wait until it is started
    async fn start(&self) -> Result<Self::Output>;

    /// Stop the component and wait until it is stopped
    async fn stop(&self) -> Result<()>;

    /// Stop then start, returning the new result
    async fn restart(&self) -> Result<Self::Output>;

    /// Lock a started component
    fn lock(&self) -> Result<LockGuard>;

    /// Lock the component, starting it first if needed.
    ///
    /// Retries when racing with a concurrent stop or freeze.
    async fn start_and_lock(&self) -> Result<LockGuard>;

    /// [`ComponentExt::start_and_lock`] that gives up when `token` is cancelled
    async fn start_and_lock_with(&self, token: &CancellationToken) -> Result<LockGuard>;

    /// Wait until the component is started or locked
    async fn when_started(&self) -> Result<Self::Output>;

    async fn when_started_with(&self, token: &CancellationToken) -> Result<Self::Output>;

    /// Wait until the component is stopped or frozen
    async fn when_stopped(&self) -> Result<()>;

    async fn when_stopped_with(&self, token: &CancellationToken) -> Result<()>;

    /// Result of a started or locked component
    fn result(&self) -> Result<Self::Output>;
}

#[async_trait]
impl<C: Component + ?Sized> ComponentExt for Arc<C> {
    type Output = C::Output;

    async fn start(&self) -> Result<C::Output> {
        // Subscribe first so a fast start/stop cycle cannot be missed
        let mut states = self.subscribe();
        if !self.send(Message::Start) {
            return Err(LifelineError::invalid_state("start", self.state().kind()));
        }

        let started = states
            .wait_for_kind(&[StateKind::Started], "Started")
            .await?;
        into_result(started, self.as_ref())
    }

    async fn stop(&self) -> Result<()> {
        let mut states = self.subscribe();
        if !self.send(Message::Stop) {
            return Err(LifelineError::invalid_state("stop", self.state().kind()));
        }

        states
            .wait_for_kind(&[StateKind::Stopped], "Stopped")
            .await?;
        Ok(())
    }

    async fn restart(&self) -> Result<C::Output> {
        self.stop().await?;
        self.start().await
    }

    fn lock(&self) -> Result<LockGuard> {
        if self.send(Message::Lock) {
            Ok(LockGuard::acquired(Arc::clone(self)))
        } else {
            Err(LifelineError::invalid_state("lock", self.state().kind()))
        }
    }

    async fn start_and_lock(&self) -> Result<LockGuard> {
        start_and_lock(self, None).await
    }

    async fn start_and_lock_with(&self, token: &CancellationToken) -> Result<LockGuard> {
        start_and_lock(self, Some(token)).await
    }

    async fn when_started(&self) -> Result<C::Output> {
        when_started(self, None).await
    }

    async fn when_started_with(&self, token: &CancellationToken) -> Result<C::Output> {
        when_started(self, Some(token)).await
    }

    async fn when_stopped(&self) -> Result<()> {
        when_stopped(self, None).await
    }

    async fn when_stopped_with(&self, token: &CancellationToken) -> Result<()> {
        when_stopped(self, Some(token)).await
    }

    fn result(&self) -> Result<C::Output> {
        let state = self.state();
        match state.result() {
            Some(result) => Ok(result.clone()),
            None => Err(LifelineError::invalid_state(
                "read the result of",
                state.kind(),
            )),
        }
    }
}

async fn start_and_lock<C: Component + ?Sized>(
    component: &Arc<C>,
    token: Option<&CancellationToken>,
) -> Result<LockGuard> {
    loop {
        if component.send(Message::Lock) {
            return Ok(LockGuard::acquired(Arc::clone(component)));
        }

        let mut states = component.subscribe();
        if component.send(Message::Start) {
            debug!("Starting '{}' before locking it", component.name());
            states
                .wait_until(ComponentState::is_operational, "Started", token)
                .await?;
        } else {
            // Starting, stopping or frozen: wait for it to settle, then retry
            states
                .wait_until(
                    |state| {
                        matches!(
                            state.kind(),
                            StateKind::Stopped | StateKind::Started | StateKind::Locked
                        )
                    },
                    "a settled state",
                    token,
                )
                .await?;
        }
    }
}

async fn when_started<C: Component + ?Sized>(
    component: &Arc<C>,
    token: Option<&CancellationToken>,
) -> Result<C::Output> {
    let started = component
        .subscribe()
        .wait_until(ComponentState::is_operational, "Started", token)
        .await?;
    into_result(started, component.as_ref())
}

async fn when_stopped<C: Component + ?Sized>(
    component: &Arc<C>,
    token: Option<&CancellationToken>,
) -> Result<()> {
    component
        .subscribe()
        .wait_until(ComponentState::is_idle, "Stopped", token)
        .await?;
    Ok(())
}

fn into_result<C: Component + ?Sized>(
    state: ComponentState<C::Output>,
    component: &C,
) -> Result<C::Output> {
    let kind = state.kind();
    match state {
        ComponentState::Started(result) | ComponentState::Locked { result, .. } => Ok(result),
        _ => {
            debug!("Component '{}' settled in {} without a result", component.name(), kind);
            Err(LifelineError::invalid_state("read the result of", kind))
        }
    }
}
