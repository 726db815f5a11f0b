use super::dependencies::lock_all;
use super::projection::{FromSlots, Slots};
use crate::component::{Component, ComponentExt, LockGuard, Routine};
use crate::error::{LifelineError, ProjectionError, Result};
use crate::lifecycle::{ComponentState, Message, StateStream};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Erased view of a facade member: it can be locked and yields a boxed result
trait Member: Send + Sync {
    fn start_and_lock(&self) -> BoxFuture<'_, Result<LockGuard>>;

    fn boxed_result(&self) -> Result<Box<dyn Any + Send + Sync>>;
}

struct Erased<C: ?Sized>(Arc<C>);

impl<C: Component + ?Sized> Member for Erased<C> {
    fn start_and_lock(&self) -> BoxFuture<'_, Result<LockGuard>> {
        self.0.start_and_lock()
    }

    fn boxed_result(&self) -> Result<Box<dyn Any + Send + Sync>> {
        let result = self.0.result()?;
        Ok(Box::new(result))
    }
}

type Members = Vec<(String, Arc<dyn Member>)>;

/// Component projecting several members' results onto one typed value.
///
/// Each member is registered under a slot name. On start every member is
/// started and locked, their results are collected into [`Slots`] and
/// `R::from_slots` builds the facade's result.
pub struct Facade<R> {
    routine: Arc<Routine<R>>,
    members: Arc<Mutex<Members>>,
}

impl<R: FromSlots> Facade<R> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let members: Arc<Mutex<Members>> = Arc::new(Mutex::new(Vec::new()));

        let snapshot_source = Arc::clone(&members);
        let label = name.clone();
        let routine = Routine::new(name, move |run| {
            let members = snapshot_source.lock().clone();
            let label = label.clone();
            async move {
                let attempts = members
                    .iter()
                    .map(|(_, member)| Member::start_and_lock(member.as_ref()))
                    .collect();
                let guards = lock_all(attempts).await?;

                let mut slots = Slots::new();
                for (slot, member) in &members {
                    slots.insert_boxed(slot.clone(), member.boxed_result()?);
                }
                let result = R::from_slots(&mut slots).map_err(LifelineError::from)?;

                debug!("Facade '{}' projected {} slots", label, members.len());
                run.operational(result).await;
                drop(guards);
                Ok(())
            }
        });

        Arc::new(Self { routine, members })
    }

    /// Register `component` under `slot`.
    ///
    /// Same freeze discipline as [`super::Bag::add`]: fails unless the facade is
    /// stopped. Slot names must be unique.
    pub fn add<C>(&self, slot: impl Into<String>, component: Arc<C>) -> Result<()>
    where
        C: Component + ?Sized,
    {
        let slot = slot.into();
        if !self.routine.send(Message::Freeze) {
            return Err(LifelineError::invalid_state(
                "add a member to",
                self.routine.state().kind(),
            ));
        }

        let outcome: Result<()> = {
            let mut members = self.members.lock();
            if members.iter().any(|(existing, _)| *existing == slot) {
                Err(ProjectionError::Duplicate { slot }.into())
            } else {
                debug!(
                    "Facade '{}' slot '{}' bound to '{}'",
                    self.routine.name(),
                    slot,
                    component.name()
                );
                members.push((slot, Arc::new(Erased(component)) as Arc<dyn Member>));
                Ok(())
            }
        };

        self.routine.send(Message::Unfreeze);
        outcome
    }

    /// Chaining form of [`Facade::add`]
    pub fn with<C>(self: Arc<Self>, slot: impl Into<String>, component: Arc<C>) -> Result<Arc<Self>>
    where
        C: Component + ?Sized,
    {
        self.add(slot, component)?;
        Ok(self)
    }

    pub fn slots(&self) -> Vec<String> {
        self.members
            .lock()
            .iter()
            .map(|(slot, _)| slot.clone())
            .collect()
    }
}

impl<R: FromSlots> Component for Facade<R> {
    type Output = R;

    fn name(&self) -> &str {
        self.routine.name()
    }

    fn state(&self) -> ComponentState<R> {
        self.routine.state()
    }

    fn send(&self, message: Message) -> bool {
        self.routine.send(message)
    }

    fn subscribe(&self) -> StateStream<R> {
        self.routine.subscribe()
    }
}
