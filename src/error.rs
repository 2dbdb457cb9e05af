//! Error types and result handling for rmq-producer.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Errors fall into three groups a caller can always tell apart:
//!
//! - **Invalid input**: [`Error::InvalidArgument`], [`Error::OutOfRange`].
//!   Detected before the session is touched; nothing is applied.
//! - **Rejected by the session**: [`Error::ConfigurationRejected`],
//!   [`Error::SessionCreationFailed`], [`Error::SendFailed`]. The raw status
//!   code returned by the session is carried unmodified.
//! - **Wrong lifecycle state**: [`Error::NotStarted`], [`Error::InvalidState`].
//!
//! # Example
//!
//! ```rust
//! use rmq_producer::{Error, LoopbackConnector, Producer};
//!
//! let connector = LoopbackConnector::new();
//! match Producer::new(&connector, "  ") {
//!     Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "group_name"),
//!     other => panic!("unexpected: {:?}", other.map(|_| ())),
//! }
//! ```

use crate::producer::ProducerState;
use crate::session::StatusCode;
use thiserror::Error;

/// The main error type for producer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required string was blank, a message was unset, or an enum value is
    /// not accepted (e.g. `LogLevel::None`).
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        name: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A numeric option fell outside its allowed bounds.
    #[error("Value {value} for `{name}` is out of range (expected {expected})")]
    OutOfRange {
        /// Name of the offending option
        name: &'static str,
        /// The rejected value
        value: i64,
        /// Human readable description of the accepted range
        expected: &'static str,
    },

    /// The session refused an option that passed local validation.
    #[error("Session rejected option `{option}` with status {code}")]
    ConfigurationRejected {
        /// Option that was being applied
        option: &'static str,
        /// Raw status returned by the session
        code: StatusCode,
    },

    /// The connector could not create a session.
    #[error("Failed to create producer session, status {code}")]
    SessionCreationFailed {
        /// Raw status returned by the connector
        code: StatusCode,
    },

    /// A send or start was attempted outside the state that allows it.
    #[error("Producer is not started (state: {state})")]
    NotStarted {
        /// State the producer was in
        state: ProducerState,
    },

    /// An option change was attempted after the producer left `Created`.
    #[error("Cannot {operation} while producer is {state}")]
    InvalidState {
        /// Operation that was refused
        operation: &'static str,
        /// State the producer was in
        state: ProducerState,
    },

    /// A synchronous send returned a non-zero status.
    #[error("Send failed with status {code}")]
    SendFailed {
        /// Raw status returned by the session
        code: StatusCode,
    },

    /// Configuration file could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl Error {
    pub(crate) fn blank(name: &'static str) -> Self {
        Error::InvalidArgument {
            name,
            reason: "must not be empty or whitespace".to_string(),
        }
    }

    /// Returns the raw session status for failures that originate in the
    /// session layer.
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            Error::ConfigurationRejected { code, .. }
            | Error::SessionCreationFailed { code }
            | Error::SendFailed { code } => Some(*code),
            _ => None,
        }
    }

    /// True when the error was caused by the caller's input rather than by the
    /// session or the lifecycle state.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument { .. } | Error::OutOfRange { .. } | Error::Config(_)
        )
    }
}

/// A convenient Result type alias for producer operations.
///
/// This is equivalent to `std::result::Result<T, rmq_producer::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
