use super::Component;
use crate::lifecycle::{ComponentState, Machine, Message, Run, StateStream};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Component driven by a single start routine split at its operational signal.
///
/// Code before `run.operational(result).await` is the start logic, code after
/// it is the stop logic.
pub struct Routine<T> {
    machine: Arc<Machine<T>>,
}

impl<T: Clone + Send + Sync + 'static> Routine<T> {
    /// Create a component from a start routine
    pub fn new<S, F, Fut>(name: S, routine: F) -> Arc<Self>
    where
        S: Into<String>,
        F: Fn(Run<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let machine = Machine::new(name.into(), Box::new(move |run| routine(run).boxed()));
        Arc::new(Self { machine })
    }

    /// Create a component from an async factory.
    ///
    /// The produced value is the started result. On stop the component's copy is
    /// dropped, which releases whatever the value owns once consumers drop theirs.
    pub fn from_action<S, F, Fut>(name: S, action: F) -> Arc<Self>
    where
        S: Into<String>,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let action = Arc::new(action);

        Self::new(name, move |run| {
            let action = Arc::clone(&action);
            let label = label.clone();
            async move {
                let result = (*action)().await?;
                run.operational(result).await;
                debug!("Releasing result of action component '{}'", label);
                Ok(())
            }
        })
    }

    /// Number of live subscriptions to this component's state
    pub fn subscriber_count(&self) -> usize {
        self.machine.subscriber_count()
    }
}

impl<T: Clone + Send + Sync + 'static> Component for Routine<T> {
    type Output = T;

    fn name(&self) -> &str {
        self.machine.name()
    }

    fn state(&self) -> ComponentState<T> {
        self.machine.state()
    }

    fn send(&self, message: Message) -> bool {
        self.machine.send(message)
    }

    fn subscribe(&self) -> StateStream<T> {
        self.machine.subscribe()
    }
}
