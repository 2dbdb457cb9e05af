use super::Producer;
use crate::config::{LogLevel, LogRotation, ProducerConfig, SessionCredentials};
use crate::session::Connector;
use crate::Result;
use std::path::PathBuf;

/// Fluent construction of a [`Producer`].
///
/// Nothing is validated until [`ProducerBuilder::build`], which hands the
/// collected options to [`Producer::from_config`].
///
/// ```rust
/// use rmq_producer::{LogLevel, LoopbackConnector, ProducerBuilder};
///
/// let connector = LoopbackConnector::new();
/// let producer = ProducerBuilder::new("G1")
///     .name_server_address("127.0.0.1:9876")
///     .log_path("/tmp/rmq/producer_log.txt")
///     .log_level(LogLevel::Info)
///     .build(&connector)
///     .unwrap();
/// assert_eq!(producer.config().log_level, LogLevel::Info);
/// ```
#[derive(Debug, Clone)]
pub struct ProducerBuilder {
    config: ProducerConfig,
}

impl ProducerBuilder {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            config: ProducerConfig::new(group_name),
        }
    }

    pub fn from_config(config: ProducerConfig) -> Self {
        Self { config }
    }

    pub fn name_server_address(mut self, address: impl Into<String>) -> Self {
        self.config.name_server_address = Some(address.into());
        self
    }

    pub fn name_server_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.name_server_domain = Some(domain.into());
        self
    }

    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.config.instance_name = Some(instance_name.into());
        self
    }

    pub fn session_credentials(mut self, credentials: SessionCredentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn log_rotation(mut self, file_count: i32, file_size: i64) -> Self {
        self.config.log_rotation = Some(LogRotation {
            file_count,
            file_size,
        });
        self
    }

    pub fn send_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.config.send_timeout_ms = timeout_ms;
        self
    }

    pub fn max_message_size(mut self, size: i32) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn compress_level(mut self, level: i32) -> Self {
        self.config.compress_level = Some(level);
        self
    }

    pub fn auto_retry_times(mut self, times: i32) -> Self {
        self.config.auto_retry_times = times;
        self
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn build<C: Connector>(self, connector: &C) -> Result<Producer<C::Session>> {
        Producer::from_config(connector, &self.config)
    }
}
