//! Process host for a root component: start with a timeout, wait for a
//! shutdown trigger, stop with a timeout.

mod host;
mod runtime;
mod shutdown;
mod types;


pub use host::Host;
pub use types::{ShutdownHandle, ShutdownReason};
