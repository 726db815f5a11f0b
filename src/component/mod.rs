mod ext;
mod guard;
mod routine;


pub use ext::ComponentExt;
pub use guard::LockGuard;
pub use routine::Routine;

use crate::lifecycle::{ComponentState, Message, StateStream};
use std::sync::Arc;

/// A unit of work with a lifecycle state machine.
///
/// All state changes go through [`Component::send`]; the derived operations on
/// [`ComponentExt`] (start, stop, lock, ...) are built from `send` and
/// `subscribe` alone.
pub trait Component: Send + Sync + 'static {
    /// Value published while the component is started
    type Output: Clone + Send + Sync + 'static;

    /// Name used in logs
    fn name(&self) -> &str;

    /// Current state
    fn state(&self) -> ComponentState<Self::Output>;

    /// Try to apply a control message; returns whether it was accepted
    fn send(&self, message: Message) -> bool;

    /// Stream of the current state followed by every later change
    fn subscribe(&self) -> StateStream<Self::Output>;
}

/// Type-erased shared handle to a component producing `T`
pub type SharedComponent<T> = Arc<dyn Component<Output = T>>;
