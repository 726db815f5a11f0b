use super::broadcast::{Broadcaster, StateStream};
use super::run::Run;
use super::state::{ComponentState, Message, StateKind, Transition};
use crate::error::Failure;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

/// Boxed start routine shared by every start of one machine
pub(crate) type StartRoutine<T> =
    dyn Fn(Run<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

type Outcome = Result<anyhow::Result<()>, Box<dyn Any + Send>>;

/// State machine for one component instance.
///
/// Every transition is evaluated and applied while holding `inner`, which
/// serializes concurrent senders. The start routine runs on its own tokio task
/// and only touches the machine through [`Run`] and the completion hook.
pub(crate) struct Machine<T> {
    name: String,
    inner: Mutex<Inner<T>>,
    routine: Box<StartRoutine<T>>,
}

struct Inner<T> {
    broadcast: Broadcaster<T>,
    /// Wakes the parked routine; present only while operational
    resume: Option<oneshot::Sender<()>>,
}

impl<T: Clone> Inner<T> {
    fn state(&self) -> &ComponentState<T> {
        self.broadcast.latest()
    }

    fn set(&mut self, name: &str, state: ComponentState<T>) {
        debug!("Component '{}' state changed to: {}", name, state);
        self.broadcast.publish(state);
    }

    fn fail(&mut self, name: &str, failure: Failure) {
        if self.state().is_failed() {
            warn!(
                "Component '{}' already failed, dropping later error: {}",
                name, failure
            );
            return;
        }
        error!("Component '{}' failed: {}", name, failure);
        // Dropping the sender releases a parked routine so its cleanup can run
        self.resume = None;
        self.broadcast.publish(ComponentState::Failed(failure));
    }
}

impl<T: Clone + Send + Sync + 'static> Machine<T> {
    pub(crate) fn new(name: String, routine: Box<StartRoutine<T>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            inner: Mutex::new(Inner {
                broadcast: Broadcaster::new(ComponentState::Stopped),
                resume: None,
            }),
            routine,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> ComponentState<T> {
        self.inner.lock().state().clone()
    }

    pub(crate) fn subscribe(&self) -> StateStream<T> {
        self.inner.lock().broadcast.subscribe()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.lock().broadcast.subscriber_count()
    }

    /// Apply `message`; returns whether the transition table accepted it.
    ///
    /// Never waits: `Start` only launches the routine and `Stop` only wakes it.
    pub(crate) fn send(self: &Arc<Self>, message: Message) -> bool {
        let mut inner = self.inner.lock();
        let transition = inner.state().transition(message);

        match transition {
            Transition::Rejected => {
                trace!(
                    "Component '{}' rejected {} in state {}",
                    self.name,
                    message,
                    inner.state().kind()
                );
                false
            }
            Transition::Become(next) => {
                inner.set(&self.name, next);
                true
            }
            Transition::Start => {
                inner.set(&self.name, ComponentState::Starting);
                self.launch(&mut inner);
                true
            }
            Transition::Stop => {
                inner.set(&self.name, ComponentState::Stopping);
                match inner.resume.take() {
                    Some(resume) => {
                        if resume.send(()).is_err() {
                            warn!(
                                "Component '{}' routine was gone before it could be resumed",
                                self.name
                            );
                        }
                    }
                    None => warn!("Component '{}' has no parked routine to resume", self.name),
                }
                true
            }
        }
    }

    fn launch(self: &Arc<Self>, inner: &mut Inner<T>) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                inner.fail(
                    &self.name,
                    Failure::msg(format!("No tokio runtime to run the start routine: {}", e)),
                );
                return;
            }
        };

        let machine = Arc::downgrade(self);
        let run = Run::new(Arc::downgrade(self));

        handle.spawn(async move {
            // The routine is built on the task, outside the critical section
            let routine = match machine.upgrade() {
                Some(machine) => panic::catch_unwind(AssertUnwindSafe(|| (machine.routine)(run))),
                None => return,
            };

            let outcome = match routine {
                Ok(routine) => AssertUnwindSafe(routine).catch_unwind().await,
                Err(panic) => Err(panic),
            };

            match machine.upgrade() {
                Some(machine) => machine.complete(outcome),
                None => debug!("Start routine finished after its component was dropped"),
            }
        });
    }

    /// Called by [`Run::operational`]: Starting -> Started, returning the resume handle
    pub(crate) fn operational(&self, result: T) -> Option<oneshot::Receiver<()>> {
        let mut inner = self.inner.lock();
        match inner.state().kind() {
            StateKind::Starting => {
                let (resume, resumed) = oneshot::channel();
                inner.resume = Some(resume);
                inner.set(&self.name, ComponentState::Started(result));
                Some(resumed)
            }
            kind => {
                warn!(
                    "Component '{}' signalled operational while {}, continuing with cleanup",
                    self.name, kind
                );
                None
            }
        }
    }

    fn complete(&self, outcome: Outcome) {
        let mut inner = self.inner.lock();

        let failure = match outcome {
            Ok(Ok(())) => match inner.state().kind() {
                StateKind::Stopping => {
                    inner.set(&self.name, ComponentState::Stopped);
                    return;
                }
                StateKind::Starting => {
                    Failure::msg("Start routine completed without signalling operational")
                }
                StateKind::Started | StateKind::Locked => {
                    inner.resume = None;
                    Failure::msg("Start routine exited while the component was operational")
                }
                StateKind::Failed | StateKind::Stopped | StateKind::Frozen => return,
            },
            Ok(Err(e)) => Failure::new(e),
            Err(panic) => Failure::msg(format!("Start routine panicked: {}", panic_message(&*panic))),
        };

        inner.fail(&self.name, failure);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
