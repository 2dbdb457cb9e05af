use crate::session::StatusCode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Broker-side status of an acknowledged send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Ok,
    FlushDiskTimeout,
    FlushSlaveTimeout,
    SlaveNotAvailable,
    Unknown(i32),
}

/// Result of one successful send. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub status: SendStatus,
    pub offset: i64,
    pub message_id: String,
}

impl SendResult {
    /// What a one-way send reports: no offset and no id are known.
    pub(crate) fn oneway() -> Self {
        Self {
            status: SendStatus::Ok,
            offset: 0,
            message_id: String::new(),
        }
    }
}

/// Outcome of a one-way or orderly send.
///
/// A failed send produces no result, but the status that caused it is kept
/// in [`SendOutcome::Dropped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(SendResult),
    Dropped { code: StatusCode },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }

    pub fn result(&self) -> Option<&SendResult> {
        match self {
            SendOutcome::Sent(result) => Some(result),
            SendOutcome::Dropped { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<SendResult> {
        match self {
            SendOutcome::Sent(result) => Some(result),
            SendOutcome::Dropped { .. } => None,
        }
    }

    /// Treats a dropped send the way a synchronous send treats failure.
    pub fn into_sent(self) -> Result<SendResult> {
        match self {
            SendOutcome::Sent(result) => Ok(result),
            SendOutcome::Dropped { code } => Err(Error::SendFailed { code }),
        }
    }
}
