//! Async component lifecycle management.
//!
//! A component is driven by a small state machine (Stopped, Starting, Started,
//! Stopping, Failed, plus reference-counted Locked and Frozen levels) and a
//! start routine that runs until it signals it is operational, then parks until
//! it is told to stop. Combinators in [`compose`] build dependency-aware
//! startup, aggregates, facades and forwarding proxies on top of that protocol.

pub mod app;
pub mod component;
pub mod compose;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;

pub use app::{Host, ShutdownHandle, ShutdownReason};
pub use component::{Component, ComponentExt, LockGuard, Routine, SharedComponent};
pub use compose::{with_dependencies, Bag, Dependencies, Facade, FromSlots, Proxy, Slots};
pub use config::{LifecycleConfig, LifelineConfig, LogFormat, LoggingConfig};
pub use error::{DependencyFailure, Failure, LifelineError, ProjectionError, Result};
pub use lifecycle::{ComponentState, Message, Run, StateKind, StateStream, StateUpdate, Transition};
