use crate::lifecycle::StateKind;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot {action} component in state {state}")]
    InvalidState {
        action: &'static str,
        state: StateKind,
    },

    #[error("Component failed: {0}")]
    Failed(Failure),

    #[error("{} of {} dependencies failed to start", .failures.len(), .total)]
    Dependencies {
        total: usize,
        failures: Vec<DependencyFailure>,
    },

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("State stream closed before {expected} was observed")]
    StreamClosed { expected: &'static str },

    #[error("Wait for {expected} was cancelled")]
    Cancelled { expected: &'static str },

    #[error("Timed out after {seconds}s waiting for {expected}")]
    Timeout { expected: &'static str, seconds: u64 },

    #[error("System error: {message}")]
    System { message: String },
}

impl LifelineError {
    pub fn invalid_state(action: &'static str, state: StateKind) -> Self {
        Self::InvalidState { action, state }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// The failure cause carried by this error, if it came from a failed component
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LifelineError>;

/// Cause of a component entering the `Failed` state.
///
/// Cheap to clone so the same cause can be replayed to every subscriber.
#[derive(Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    pub fn new<E: Into<anyhow::Error>>(error: E) -> Self {
        Self(Arc::new(error.into()))
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True if both values share the same underlying cause
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failure({:?})", self.0)
    }
}

impl From<Failure> for LifelineError {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}

/// A single member that could not be started and locked during a composite start
#[derive(Debug)]
pub struct DependencyFailure {
    pub index: usize,
    pub error: LifelineError,
}

impl fmt::Display for DependencyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency {}: {}", self.index, self.error)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("No value supplied for slot '{slot}'")]
    Missing { slot: String },

    #[error("Slot '{slot}' does not hold a {expected}")]
    TypeMismatch { slot: String, expected: &'static str },

    #[error("Slot '{slot}' registered twice")]
    Duplicate { slot: String },
}
