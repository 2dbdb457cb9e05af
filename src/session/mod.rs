//! The seam between the producer and the underlying client session.
//!
//! A session is the object that talks to the cluster: it resolves name
//! servers, keeps connections and actually moves bytes. The producer never
//! looks inside it. Every primitive reports a [`StatusCode`], zero meaning
//! success; the producer maps those codes onto [`crate::Error`] without
//! interpreting specific values.
//!
//! [`loopback`] provides an in-process implementation backed by a shared
//! in-memory broker.

pub mod handle;
pub mod loopback;

pub use handle::SessionHandle;

use crate::config::{LogLevel, SessionCredentials};
use crate::message::Message;
use crate::producer::SendResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Raw status returned by a session primitive. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> i32 {
        self.0
    }
}

impl From<i32> for StatusCode {
    fn from(raw: i32) -> Self {
        StatusCode(raw)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One option forwarded to [`Session::configure`]. Values are already validated.
#[derive(Debug, Clone, Copy)]
pub enum SessionOption<'a> {
    NameServerAddress(&'a str),
    NameServerDomain(&'a str),
    GroupName(&'a str),
    InstanceName(&'a str),
    Credentials(&'a SessionCredentials),
    LogPath(&'a Path),
    LogFileNumAndSize { file_count: u32, file_size: u64 },
    LogLevel(LogLevel),
    SendTimeout { millis: u32 },
    CompressLevel(i32),
    MaxMessageSize(u32),
}

impl SessionOption<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            SessionOption::NameServerAddress(_) => "name_server_address",
            SessionOption::NameServerDomain(_) => "name_server_domain",
            SessionOption::GroupName(_) => "group_name",
            SessionOption::InstanceName(_) => "instance_name",
            SessionOption::Credentials(_) => "session_credentials",
            SessionOption::LogPath(_) => "log_path",
            SessionOption::LogFileNumAndSize { .. } => "log_file_num_and_size",
            SessionOption::LogLevel(_) => "log_level",
            SessionOption::SendTimeout { .. } => "send_timeout",
            SessionOption::CompressLevel(_) => "compress_level",
            SessionOption::MaxMessageSize(_) => "max_message_size",
        }
    }
}

/// Queue selection callback handed to [`Session::send_orderly`].
///
/// Called with the queue count of the message's topic and the message itself,
/// once per attempt. `None` means the selection was refused and the attempt
/// must not be forwarded.
pub type SelectQueue<'a> = dyn Fn(usize, &Message) -> Option<usize> + 'a;

/// An underlying client session.
///
/// Configuration and lifecycle primitives take `&mut self`: the producer calls
/// them while holding exclusive access. Sends take `&self` and may run
/// concurrently from several threads.
pub trait Session: Send + Sync {
    fn configure(&mut self, option: &SessionOption<'_>) -> StatusCode;

    fn start(&mut self) -> StatusCode;

    fn shutdown(&mut self) -> StatusCode;

    /// Frees the session. Called at most once per session.
    fn destroy(&mut self) -> StatusCode;

    /// Blocks until the broker acknowledges. `Err` always holds a non-zero code.
    fn send_sync(&self, message: &Message) -> Result<SendResult, StatusCode>;

    fn send_oneway(&self, message: &Message) -> StatusCode;

    /// Sends to the queue chosen by `select`, retrying the whole
    /// select-and-send step up to `auto_retry_times` more times on failure.
    fn send_orderly(
        &self,
        message: &Message,
        select: &SelectQueue<'_>,
        auto_retry_times: i32,
    ) -> Result<SendResult, StatusCode>;
}

/// Creates sessions for a producer group.
pub trait Connector {
    type Session: Session;

    fn connect(&self, group_name: &str) -> Result<Self::Session, StatusCode>;
}
