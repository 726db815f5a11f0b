use super::dependencies::Dependencies;
use crate::component::{Component, Routine, SharedComponent};
use crate::error::{LifelineError, Result};
use crate::lifecycle::{ComponentState, Message, StateStream};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregate of peer components started and locked together.
///
/// The started result holds one member result per member, in the order the
/// members were added. Stopping the bag releases its locks but leaves each
/// member running if someone else still holds it.
pub struct Bag<T> {
    routine: Arc<Routine<Vec<T>>>,
    members: Arc<Mutex<Vec<SharedComponent<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Bag<T> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let members: Arc<Mutex<Vec<SharedComponent<T>>>> = Arc::new(Mutex::new(Vec::new()));

        let snapshot_source = Arc::clone(&members);
        let label = name.clone();
        let routine = Routine::new(name, move |run| {
            // Membership is fixed for the lifetime of this start
            let members = snapshot_source.lock().clone();
            let label = label.clone();
            async move {
                info!("Starting bag '{}' with {} members", label, members.len());
                let (results, guards) = members.acquire().await?;
                run.operational(results).await;
                debug!("Bag '{}' releasing {} member locks", label, guards.len());
                drop(guards);
                Ok(())
            }
        });

        Arc::new(Self { routine, members })
    }

    /// Create a bag and add `members` in order
    pub fn with_members<I>(name: impl Into<String>, members: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = SharedComponent<T>>,
    {
        let bag = Self::new(name);
        for member in members {
            bag.add(member)?;
        }
        Ok(bag)
    }

    /// Append a member.
    ///
    /// The bag is frozen for the duration of the change, so this fails unless
    /// the bag is stopped (or already frozen by someone else).
    pub fn add(&self, member: SharedComponent<T>) -> Result<()> {
        if !self.routine.send(Message::Freeze) {
            return Err(LifelineError::invalid_state(
                "add a member to",
                self.routine.state().kind(),
            ));
        }

        debug!(
            "Adding '{}' to bag '{}'",
            member.name(),
            self.routine.name()
        );
        self.members.lock().push(member);

        self.routine.send(Message::Unfreeze);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Component for Bag<T> {
    type Output = Vec<T>;

    fn name(&self) -> &str {
        self.routine.name()
    }

    fn state(&self) -> ComponentState<Vec<T>> {
        self.routine.state()
    }

    fn send(&self, message: Message) -> bool {
        self.routine.send(message)
    }

    fn subscribe(&self) -> StateStream<Vec<T>> {
        self.routine.subscribe()
    }
}
