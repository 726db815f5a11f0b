use super::state::{ComponentState, StateKind};
use crate::error::{Failure, LifelineError, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A single item of a state stream; a failure terminates the stream
pub type StateUpdate<T> = std::result::Result<ComponentState<T>, Failure>;

/// Replay-latest fan-out of state changes.
///
/// Every subscriber owns an unbounded channel, so publishing never waits on a slow
/// subscriber and subscriber code never runs while the publisher holds its lock.
pub(crate) struct Broadcaster<T> {
    latest: ComponentState<T>,
    subscribers: Vec<mpsc::UnboundedSender<StateUpdate<T>>>,
}

impl<T: Clone> Broadcaster<T> {
    pub(crate) fn new(initial: ComponentState<T>) -> Self {
        Self {
            latest: initial,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn latest(&self) -> &ComponentState<T> {
        &self.latest
    }

    /// Register a subscriber; it receives the latest state first
    pub(crate) fn subscribe(&mut self) -> StateStream<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        match &self.latest {
            ComponentState::Failed(failure) => {
                // The sender is dropped right away so the stream ends after the failure
                let _ = sender.send(Err(failure.clone()));
            }
            state => {
                if sender.send(Ok(state.clone())).is_ok() {
                    // Prune finished waiters even when nothing is being published
                    self.subscribers.retain(|subscriber| !subscriber.is_closed());
                    self.subscribers.push(sender);
                }
            }
        }
        StateStream::new(receiver)
    }

    #[cfg(test)]
    pub(crate) fn retained(&self) -> usize {
        self.subscribers.len()
    }

    /// Record `state` as the latest and deliver it to every live subscriber.
    ///
    /// Publishing a failure closes every subscription. Once failed, further
    /// publishes are ignored until [`Broadcaster::revive`] is called.
    pub(crate) fn publish(&mut self, state: ComponentState<T>) {
        if self.latest.is_failed() {
            trace!("Ignoring {} published after failure", state);
            return;
        }

        match &state {
            ComponentState::Failed(failure) => {
                for subscriber in self.subscribers.drain(..) {
                    let _ = subscriber.send(Err(failure.clone()));
                }
            }
            _ => {
                self.subscribers
                    .retain(|subscriber| subscriber.send(Ok(state.clone())).is_ok());
            }
        }

        self.latest = state;
    }

    /// Leave the failed state without notifying anyone
    pub(crate) fn revive(&mut self, state: ComponentState<T>) -> bool {
        if self.latest.is_failed() {
            self.latest = state;
            true
        } else {
            false
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }
}

/// Ordered stream of a component's states: the current one, then every change.
///
/// Ends with `Err(failure)` if the component fails, or ends plainly when the
/// component is dropped.
pub struct StateStream<T> {
    receiver: mpsc::UnboundedReceiver<StateUpdate<T>>,
}

impl<T> StateStream<T> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<StateUpdate<T>>) -> Self {
        Self { receiver }
    }

    /// Next state update, `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<StateUpdate<T>> {
        self.receiver.recv().await
    }

    /// Wait for the first state matching `predicate`
    pub async fn wait_for<P>(&mut self, predicate: P, expected: &'static str) -> Result<ComponentState<T>>
    where
        P: FnMut(&ComponentState<T>) -> bool,
    {
        self.wait_until(predicate, expected, None).await
    }

    /// Like [`StateStream::wait_for`], abandoning the wait when `token` is cancelled.
    ///
    /// Cancelling only gives up on waiting; the component itself is untouched.
    pub async fn wait_for_with<P>(
        &mut self,
        predicate: P,
        expected: &'static str,
        token: &CancellationToken,
    ) -> Result<ComponentState<T>>
    where
        P: FnMut(&ComponentState<T>) -> bool,
    {
        self.wait_until(predicate, expected, Some(token)).await
    }

    pub(crate) async fn wait_until<P>(
        &mut self,
        mut predicate: P,
        expected: &'static str,
        token: Option<&CancellationToken>,
    ) -> Result<ComponentState<T>>
    where
        P: FnMut(&ComponentState<T>) -> bool,
    {
        loop {
            let update = match token {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(LifelineError::Cancelled { expected });
                    }
                    update = self.receiver.recv() => update,
                },
                None => self.receiver.recv().await,
            };

            match update {
                Some(Ok(state)) if predicate(&state) => return Ok(state),
                Some(Ok(_)) => continue,
                Some(Err(failure)) => return Err(LifelineError::Failed(failure)),
                None => return Err(LifelineError::StreamClosed { expected }),
            }
        }
    }

    /// Wait until the component reaches one of `kinds`
    pub async fn wait_for_kind(
        &mut self,
        kinds: &[StateKind],
        expected: &'static str,
    ) -> Result<ComponentState<T>> {
        self.wait_for(|state| kinds.contains(&state.kind()), expected)
            .await
    }
}

impl<T> Stream for StateStream<T> {
    type Item = StateUpdate<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
