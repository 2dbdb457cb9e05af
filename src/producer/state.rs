use serde::Serialize;
use std::fmt;

/// Lifecycle of a producer.
///
/// ```text
/// Created --start--> Started --shutdown--> Shutdown
///    |                  |
///    +----destroy-------+--------------> Destroyed
/// ```
///
/// `Shutdown` and `Destroyed` are terminal: the session has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerState {
    Created,
    Started,
    Shutdown,
    Destroyed,
}

impl ProducerState {
    pub fn can_start(self) -> bool {
        self == ProducerState::Created
    }

    pub fn can_send(self) -> bool {
        self == ProducerState::Started
    }

    pub fn can_configure(self) -> bool {
        self == ProducerState::Created
    }

    pub fn is_released(self) -> bool {
        matches!(self, ProducerState::Shutdown | ProducerState::Destroyed)
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProducerState::Created => "created",
            ProducerState::Started => "started",
            ProducerState::Shutdown => "shutdown",
            ProducerState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
