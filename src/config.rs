use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Top level configuration for the `rmq-producer` binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub producer: ProducerConfig,
    #[serde(default)]
    pub loopback: LoopbackConfig,
}

/// Options applied to a producer session before it is started.
///
/// Numeric fields are signed so that out-of-range values survive
/// deserialization and are reported as [`Error::OutOfRange`] by
/// [`ProducerConfig::validate`] rather than as a parse error.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProducerConfig {
    pub group_name: String,
    #[serde(default)]
    pub name_server_address: Option<String>,
    #[serde(default)]
    pub name_server_domain: Option<String>,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub credentials: Option<SessionCredentials>,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_rotation: Option<LogRotation>,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: i32,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: i32,
    #[serde(default)]
    pub compress_level: Option<i32>,
    #[serde(default = "default_auto_retry_times")]
    pub auto_retry_times: i32,
}

/// Verbosity of the session's own log file.
///
/// `None` is a valid value to hold but is rejected by every setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    #[default]
    Trace = 6,
    None = 7,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::None => "none",
        };
        f.write_str(name)
    }
}

/// Session log file rotation: how many files to keep and how large each may grow.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LogRotation {
    pub file_count: i32,
    pub file_size: i64,
}

/// Access key, secret key and channel, always applied together.
///
/// The only way to obtain a value is through [`SessionCredentials::new`] (or
/// deserialization, which goes through the same check), so a partially filled
/// triple cannot reach a session.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawCredentials", into = "RawCredentials")]
pub struct SessionCredentials {
    access_key: String,
    secret_key: String,
    channel: String,
}

#[derive(Deserialize, Serialize)]
struct RawCredentials {
    access_key: String,
    secret_key: String,
    channel: String,
}

impl SessionCredentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        channel: impl Into<String>,
    ) -> Result<Self> {
        let credentials = Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            channel: channel.into(),
        };
        require_non_blank("access_key", &credentials.access_key)?;
        require_non_blank("secret_key", &credentials.secret_key)?;
        require_non_blank("channel", &credentials.channel)?;
        Ok(credentials)
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("channel", &self.channel)
            .finish()
    }
}

impl TryFrom<RawCredentials> for SessionCredentials {
    type Error = Error;

    fn try_from(raw: RawCredentials) -> Result<Self> {
        SessionCredentials::new(raw.access_key, raw.secret_key, raw.channel)
    }
}

impl From<SessionCredentials> for RawCredentials {
    fn from(credentials: SessionCredentials) -> Self {
        Self {
            access_key: credentials.access_key,
            secret_key: credentials.secret_key,
            channel: credentials.channel,
        }
    }
}

/// Settings for the in-process loopback broker used by the binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopbackConfig {
    #[serde(default = "default_queue_count")]
    pub default_queue_count: usize,
    #[serde(default)]
    pub topics: HashMap<String, usize>,
    /// Most recent session calls kept in the broker's journal.
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            default_queue_count: default_queue_count(),
            topics: HashMap::new(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(
                ::config::Environment::with_prefix("RMQ_PRODUCER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.producer.validate()?;
        Ok(config)
    }
}

impl ProducerConfig {
    /// Creates a configuration holding the default options for `group_name`.
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            name_server_address: None,
            name_server_domain: None,
            instance_name: None,
            credentials: None,
            log_path: default_log_path(),
            log_level: default_log_level(),
            log_rotation: None,
            send_timeout_ms: default_send_timeout_ms(),
            max_message_size: default_max_message_size(),
            compress_level: None,
            auto_retry_times: default_auto_retry_times(),
        }
    }

    /// Checks every option with the same rules the individual setters apply.
    pub fn validate(&self) -> Result<()> {
        require_non_blank("group_name", &self.group_name)?;
        if let Some(address) = &self.name_server_address {
            require_non_blank("name_server_address", address)?;
        }
        if let Some(domain) = &self.name_server_domain {
            require_non_blank("name_server_domain", domain)?;
        }
        if let Some(instance) = &self.instance_name {
            require_non_blank("instance_name", instance)?;
        }
        require_log_path(&self.log_path)?;
        require_log_level(self.log_level)?;
        if let Some(rotation) = &self.log_rotation {
            check_log_rotation(rotation.file_count, rotation.file_size)?;
        }
        check_send_timeout(self.send_timeout_ms)?;
        check_max_message_size(self.max_message_size)?;
        if let Some(level) = self.compress_level {
            check_compress_level(level)?;
        }
        Ok(())
    }
}

pub(crate) fn require_non_blank(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::blank(name));
    }
    Ok(())
}

pub(crate) fn require_log_path(path: &Path) -> Result<()> {
    require_non_blank("log_path", &path.to_string_lossy())
}

pub(crate) fn require_log_level(level: LogLevel) -> Result<()> {
    if level == LogLevel::None {
        return Err(Error::InvalidArgument {
            name: "log_level",
            reason: "log level `none` cannot be applied to a session".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_send_timeout(timeout_ms: i32) -> Result<u32> {
    u32::try_from(timeout_ms).map_err(|_| Error::OutOfRange {
        name: "send_timeout_ms",
        value: timeout_ms.into(),
        expected: ">= 0",
    })
}

pub(crate) fn check_max_message_size(size: i32) -> Result<u32> {
    u32::try_from(size).map_err(|_| Error::OutOfRange {
        name: "max_message_size",
        value: size.into(),
        expected: ">= 0",
    })
}

pub(crate) fn check_compress_level(level: i32) -> Result<i32> {
    if level == -1 || (0..=9).contains(&level) {
        Ok(level)
    } else {
        Err(Error::OutOfRange {
            name: "compress_level",
            value: level.into(),
            expected: "-1 or 0..=9",
        })
    }
}

pub(crate) fn check_log_rotation(file_count: i32, file_size: i64) -> Result<(u32, u64)> {
    if file_count <= 0 {
        return Err(Error::OutOfRange {
            name: "log_file_count",
            value: file_count.into(),
            expected: "> 0",
        });
    }
    if file_size <= 0 {
        return Err(Error::OutOfRange {
            name: "log_file_size",
            value: file_size,
            expected: "> 0",
        });
    }
    // both positive, so the conversions are lossless
    Ok((file_count as u32, file_size as u64))
}

fn default_log_path() -> PathBuf {
    std::env::current_dir()
        .map(|dir| dir.join("producer_log.txt"))
        .unwrap_or_else(|_| PathBuf::from("producer_log.txt"))
}

fn default_log_level() -> LogLevel {
    LogLevel::Trace
}

fn default_send_timeout_ms() -> i32 {
    3000
}

fn default_max_message_size() -> i32 {
    4_194_304 // 4MB
}

fn default_auto_retry_times() -> i32 {
    2
}

fn default_queue_count() -> usize {
    4
}

fn default_journal_capacity() -> usize {
    10_000
}
