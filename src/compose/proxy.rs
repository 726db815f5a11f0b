use crate::component::{Component, SharedComponent};
use crate::error::{LifelineError, Result};
use crate::lifecycle::{Broadcaster, ComponentState, Message, StateKind, StateStream, StateUpdate};
use futures::{future, Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Component with a stable identity whose underlying target can be swapped.
///
/// Control messages go straight to the current target. Subscribers of the
/// proxy see the target's state changes relayed through the proxy's own
/// broadcast, which survives re-attachment.
pub struct Proxy<T> {
    name: String,
    target: Mutex<Attachment<T>>,
    broadcast: Arc<Mutex<Broadcaster<T>>>,
}

struct Attachment<T> {
    component: Option<SharedComponent<T>>,
    relay: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> Proxy<T> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target: Mutex::new(Attachment {
                component: None,
                relay: None,
            }),
            broadcast: Arc::new(Mutex::new(Broadcaster::new(ComponentState::Stopped))),
        })
    }

    /// Create a proxy already attached to `target`
    pub fn with_target(name: impl Into<String>, target: SharedComponent<T>) -> Result<Arc<Self>> {
        let proxy = Self::new(name);
        proxy.attach(target)?;
        Ok(proxy)
    }

    /// Forward to `target` from now on, replacing any previous target.
    ///
    /// The target is frozen while it is taken over, so it must be stopped.
    pub fn attach(&self, target: SharedComponent<T>) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| {
            LifelineError::system(format!(
                "Attaching a proxy target needs a tokio runtime: {}",
                e
            ))
        })?;

        if !target.send(Message::Freeze) {
            return Err(LifelineError::invalid_state("attach", target.state().kind()));
        }

        {
            let mut attachment = self.target.lock();
            if let Some(relay) = attachment.relay.take() {
                relay.abort();
            }

            // The proxy already shows Stopped. The frozen replay, the level changes of
            // other freeze holders and the Stopped produced by unfreezing are not news.
            let updates = target.subscribe().skip_while(|update| {
                future::ready(matches!(
                    update,
                    Ok(ComponentState::Frozen { .. } | ComponentState::Stopped)
                ))
            });

            let mut broadcast = self.broadcast.lock();
            if broadcast.revive(ComponentState::Stopped) {
                debug!("Proxy '{}' broadcast revived after target failure", self.name);
            } else if broadcast.latest().kind() != StateKind::Stopped {
                // The previous target was left running; the new one is stopped
                broadcast.publish(ComponentState::Stopped);
            }
            drop(broadcast);

            attachment.relay = Some(handle.spawn(relay(
                updates,
                Arc::clone(&self.broadcast),
                self.name.clone(),
            )));

            info!("Proxy '{}' attached to '{}'", self.name, target.name());
            attachment.component = Some(Arc::clone(&target));
        }

        target.send(Message::Unfreeze);
        Ok(())
    }

    /// Current target, if any
    pub fn target(&self) -> Option<SharedComponent<T>> {
        self.target.lock().component.clone()
    }
}

async fn relay<T, S>(updates: S, broadcast: Arc<Mutex<Broadcaster<T>>>, name: String)
where
    T: Clone,
    S: Stream<Item = StateUpdate<T>>,
{
    tokio::pin!(updates);
    while let Some(update) = updates.next().await {
        let failed = update.is_err();
        let state = update.unwrap_or_else(ComponentState::Failed);
        broadcast.lock().publish(state);
        if failed {
            debug!("Proxy '{}' relay ended with target failure", name);
            break;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Component for Proxy<T> {
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState<T> {
        match self.target() {
            Some(target) => target.state(),
            None => ComponentState::Stopped,
        }
    }

    fn send(&self, message: Message) -> bool {
        // Clone the target out so its lock is not held while it transitions
        match self.target() {
            Some(target) => target.send(message),
            None => false,
        }
    }

    fn subscribe(&self) -> StateStream<T> {
        self.broadcast.lock().subscribe()
    }
}

impl<T> Drop for Proxy<T> {
    fn drop(&mut self) {
        if let Some(relay) = self.target.get_mut().relay.take() {
            relay.abort();
        }
    }
}
