mod broadcast;
mod machine;
mod run;
mod state;

#[cfg(test)]
mod tests;

pub use broadcast::{StateStream, StateUpdate};
pub use run::Run;
pub use state::{ComponentState, Message, StateKind, Transition};

pub(crate) use broadcast::Broadcaster;
pub(crate) use machine::Machine;
