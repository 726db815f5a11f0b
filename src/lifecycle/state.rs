use crate::error::{Failure, LifelineError};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Control messages accepted by a component's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    Start,
    Stop,
    Lock,
    Unlock,
    Freeze,
    Unfreeze,
}

impl Message {
    pub const ALL: [Message; 6] = [
        Message::Start,
        Message::Stop,
        Message::Lock,
        Message::Unlock,
        Message::Freeze,
        Message::Unfreeze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Message::Start => "Start",
            Message::Stop => "Stop",
            Message::Lock => "Lock",
            Message::Unlock => "Unlock",
            Message::Freeze => "Freeze",
            Message::Unfreeze => "Unfreeze",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Message {
    type Err = LifelineError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Message::ALL
            .into_iter()
            .find(|message| message.as_str() == token)
            .ok_or_else(|| LifelineError::system(format!("Unknown control message: {}", token)))
    }
}

/// Discriminant of [`ComponentState`], without the carried data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Stopped,
    Starting,
    Started,
    Stopping,
    Failed,
    Locked,
    Frozen,
}

impl StateKind {
    pub const ALL: [StateKind; 7] = [
        StateKind::Stopped,
        StateKind::Starting,
        StateKind::Started,
        StateKind::Stopping,
        StateKind::Failed,
        StateKind::Locked,
        StateKind::Frozen,
    ];
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Stopped => "Stopped",
            StateKind::Starting => "Starting",
            StateKind::Started => "Started",
            StateKind::Stopping => "Stopping",
            StateKind::Failed => "Failed",
            StateKind::Locked => "Locked",
            StateKind::Frozen => "Frozen",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a single component instance
#[derive(Debug, Clone)]
pub enum ComponentState<T> {
    /// Idle and startable
    Stopped,
    /// Start routine is running and has not signalled yet
    Starting,
    /// Operational, result available to consumers
    Started(T),
    /// Stop requested, cleanup running
    Stopping,
    /// Terminal; the instance can no longer be used
    Failed(Failure),
    /// Started and held by `level` outstanding locks
    Locked { level: NonZeroU32, result: T },
    /// Stopped and held by `level` outstanding freezes
    Frozen { level: NonZeroU32 },
}

/// Outcome of applying a [`Message`] to a [`ComponentState`]
#[derive(Debug, Clone)]
pub enum Transition<T> {
    /// The pair is not in the transition table; nothing changes
    Rejected,
    /// Move to `Starting` and launch the start routine
    Start,
    /// Move to `Stopping` and resume the parked routine
    Stop,
    /// Move directly to the given state
    Become(ComponentState<T>),
}

impl<T> Transition<T> {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Transition::Rejected)
    }
}

impl<T> ComponentState<T> {
    pub fn kind(&self) -> StateKind {
        match self {
            ComponentState::Stopped => StateKind::Stopped,
            ComponentState::Starting => StateKind::Starting,
            ComponentState::Started(_) => StateKind::Started,
            ComponentState::Stopping => StateKind::Stopping,
            ComponentState::Failed(_) => StateKind::Failed,
            ComponentState::Locked { .. } => StateKind::Locked,
            ComponentState::Frozen { .. } => StateKind::Frozen,
        }
    }

    /// Result of a started or locked component
    pub fn result(&self) -> Option<&T> {
        match self {
            ComponentState::Started(result) | ComponentState::Locked { result, .. } => {
                Some(result)
            }
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ComponentState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Lock or freeze level, zero for every other state
    pub fn level(&self) -> u32 {
        match self {
            ComponentState::Locked { level, .. } | ComponentState::Frozen { level } => level.get(),
            _ => 0,
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            ComponentState::Started(_) | ComponentState::Locked { .. }
        )
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ComponentState::Stopped | ComponentState::Frozen { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ComponentState::Failed(_))
    }
}

impl<T: Clone> ComponentState<T> {
    /// Evaluate the transition table for `message` against this state
    pub fn transition(&self, message: Message) -> Transition<T> {
        match self {
            ComponentState::Stopped => match message {
                Message::Start => Transition::Start,
                Message::Freeze => Transition::Become(ComponentState::Frozen {
                    level: NonZeroU32::MIN,
                }),
                _ => Transition::Rejected,
            },
            ComponentState::Started(result) => match message {
                Message::Stop => Transition::Stop,
                Message::Lock => Transition::Become(ComponentState::Locked {
                    level: NonZeroU32::MIN,
                    result: result.clone(),
                }),
                _ => Transition::Rejected,
            },
            ComponentState::Locked { level, result } => match message {
                Message::Unlock => match NonZeroU32::new(level.get() - 1) {
                    Some(level) => Transition::Become(ComponentState::Locked {
                        level,
                        result: result.clone(),
                    }),
                    None => Transition::Become(ComponentState::Started(result.clone())),
                },
                Message::Lock => match level.checked_add(1) {
                    Some(level) => Transition::Become(ComponentState::Locked {
                        level,
                        result: result.clone(),
                    }),
                    None => Transition::Rejected,
                },
                _ => Transition::Rejected,
            },
            ComponentState::Frozen { level } => match message {
                Message::Unfreeze => match NonZeroU32::new(level.get() - 1) {
                    Some(level) => Transition::Become(ComponentState::Frozen { level }),
                    None => Transition::Become(ComponentState::Stopped),
                },
                Message::Freeze => match level.checked_add(1) {
                    Some(level) => Transition::Become(ComponentState::Frozen { level }),
                    None => Transition::Rejected,
                },
                _ => Transition::Rejected,
            },
            // Transient and terminal states accept nothing
            ComponentState::Starting | ComponentState::Stopping | ComponentState::Failed(_) => {
                Transition::Rejected
            }
        }
    }

    pub fn accepts(&self, message: Message) -> bool {
        self.transition(message).is_accepted()
    }
}

impl<T> fmt::Display for ComponentState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentState::Locked { level, .. } => write!(f, "Locked({})", level),
            ComponentState::Frozen { level } => write!(f, "Frozen({})", level),
            ComponentState::Failed(failure) => write!(f, "Failed({})", failure),
            other => write!(f, "{}", other.kind()),
        }
    }
}
