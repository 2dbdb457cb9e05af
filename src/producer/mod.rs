//! The producer: option setters, lifecycle and the three send modes.
//!
//! ```rust
//! use rmq_producer::{HashQueueSelector, LoopbackConnector, Message, Producer};
//!
//! let connector = LoopbackConnector::new();
//! let producer = Producer::new(&connector, "order-service").unwrap();
//! producer.set_name_server_address("127.0.0.1:9876").unwrap();
//! assert!(producer.start().unwrap());
//!
//! let message = Message::new("orders", "created").with_keys("order-1001");
//! let result = producer.send_sync(&message).unwrap();
//! println!("stored at offset {}", result.offset);
//!
//! let outcome = producer
//!     .send_orderly(&message, &HashQueueSelector, Some("order-1001".as_bytes()))
//!     .unwrap();
//! assert!(outcome.is_sent());
//!
//! assert!(producer.shutdown());
//! ```

pub mod builder;
pub mod outcome;
pub mod selector;
pub mod state;

#[cfg(test)]
mod tests;

pub use builder::ProducerBuilder;
pub use outcome::{SendOutcome, SendResult, SendStatus};
pub use selector::{FirstQueueSelector, HashQueueSelector, QueueSelector};
pub use state::ProducerState;

use crate::config::{
    check_compress_level, check_log_rotation, check_max_message_size, check_send_timeout,
    require_log_level, require_log_path, require_non_blank, LogLevel, LogRotation,
    ProducerConfig, SessionCredentials,
};
use crate::message::Message;
use crate::session::{Connector, Session, SessionHandle, SessionOption, StatusCode};
use crate::{Error, Result};
use std::cell::Cell;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, instrument, warn};

struct Inner<S: Session> {
    state: ProducerState,
    handle: SessionHandle<S>,
    config: ProducerConfig,
}

impl<S: Session> Inner<S> {
    fn sendable(&self) -> Result<&S> {
        let state = self.state;
        if !state.can_send() {
            return Err(Error::NotStarted { state });
        }
        self.handle.get().ok_or(Error::NotStarted { state })
    }

    fn configurable(&mut self) -> Result<&mut S> {
        let state = self.state;
        let refused = Error::InvalidState {
            operation: "change options",
            state,
        };
        if !state.can_configure() {
            return Err(refused);
        }
        self.handle.get_mut().ok_or(refused)
    }

    /// Releases the session; true when it was already gone or destroyed cleanly.
    fn release(&mut self) -> bool {
        self.handle.release().map_or(true, StatusCode::is_ok)
    }
}

/// A named producer bound to one session.
///
/// All methods take `&self`; the producer can be shared between threads.
/// Sends run concurrently with each other, while lifecycle transitions and
/// option changes wait for in-flight sends to finish.
pub struct Producer<S: Session> {
    inner: RwLock<Inner<S>>,
    auto_retry_times: AtomicI32,
    default_selector: FirstQueueSelector,
}

impl<S: Session> Producer<S> {
    /// Creates a producer for `group_name` with the default options applied.
    pub fn new<C>(connector: &C, group_name: &str) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        Self::from_config(connector, &ProducerConfig::new(group_name))
    }

    /// Creates a producer and applies every option in `config`.
    ///
    /// The whole configuration is validated before a session is created. The
    /// defaults are applied first, in order: log path, log level, send timeout,
    /// max message size, auto-retry count. Then the constructor options follow
    /// in order (name server address, log path, log level), and after them
    /// every other setting that differs from its default. If any step fails
    /// the session is released before the error is returned.
    pub fn from_config<C>(connector: &C, config: &ProducerConfig) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        config.validate()?;

        let session = connector.connect(&config.group_name).map_err(|code| {
            error!(group = %config.group_name, status = %code, "Failed to create producer session");
            Error::SessionCreationFailed { code }
        })?;
        info!(group = %config.group_name, "Created producer session");

        let defaults = ProducerConfig::new(config.group_name.clone());
        let producer = Self {
            inner: RwLock::new(Inner {
                state: ProducerState::Created,
                handle: SessionHandle::new(session),
                config: defaults.clone(),
            }),
            auto_retry_times: AtomicI32::new(defaults.auto_retry_times),
            default_selector: FirstQueueSelector,
        };

        producer.set_log_path(&defaults.log_path)?;
        producer.set_log_level(defaults.log_level)?;
        producer.set_send_timeout(defaults.send_timeout_ms)?;
        producer.set_max_message_size(defaults.max_message_size)?;
        producer.set_auto_retry_times(defaults.auto_retry_times);

        if let Some(address) = &config.name_server_address {
            producer.set_name_server_address(address)?;
        }
        if config.log_path != defaults.log_path {
            producer.set_log_path(&config.log_path)?;
        }
        if config.log_level != defaults.log_level {
            producer.set_log_level(config.log_level)?;
        }
        if config.send_timeout_ms != defaults.send_timeout_ms {
            producer.set_send_timeout(config.send_timeout_ms)?;
        }
        if config.max_message_size != defaults.max_message_size {
            producer.set_max_message_size(config.max_message_size)?;
        }
        producer.set_auto_retry_times(config.auto_retry_times);

        if let Some(domain) = &config.name_server_domain {
            producer.set_name_server_domain(domain)?;
        }
        if let Some(instance) = &config.instance_name {
            producer.set_instance_name(instance)?;
        }
        if let Some(credentials) = &config.credentials {
            producer.apply_session_credentials(credentials)?;
        }
        if let Some(rotation) = &config.log_rotation {
            producer.set_log_file_num_and_size(rotation.file_count, rotation.file_size)?;
        }
        if let Some(level) = config.compress_level {
            producer.set_compress_level(level)?;
        }

        Ok(producer)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<S>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<S>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ProducerState {
        self.read().state
    }

    pub fn group_name(&self) -> String {
        self.read().config.group_name.clone()
    }

    /// Snapshot of the options applied so far.
    pub fn config(&self) -> ProducerConfig {
        let mut config = self.read().config.clone();
        config.auto_retry_times = self.auto_retry_times();
        config
    }

    /// The selector that always picks the first queue, owned by this producer.
    pub fn default_selector(&self) -> &FirstQueueSelector {
        &self.default_selector
    }

    fn apply<F>(&self, option: SessionOption<'_>, update: F) -> Result<()>
    where
        F: FnOnce(&mut ProducerConfig),
    {
        let mut inner = self.write();
        let status = inner.configurable()?.configure(&option);
        if !status.is_ok() {
            warn!(option = option.name(), status = %status, "Session rejected producer option");
            return Err(Error::ConfigurationRejected {
                option: option.name(),
                code: status,
            });
        }
        update(&mut inner.config);
        debug!(option = ?option, "Applied producer option");
        Ok(())
    }

    // ---- options ----

    pub fn set_name_server_address(&self, address: &str) -> Result<()> {
        require_non_blank("name_server_address", address)?;
        self.apply(SessionOption::NameServerAddress(address), |config| {
            config.name_server_address = Some(address.to_string())
        })
    }

    pub fn set_name_server_domain(&self, domain: &str) -> Result<()> {
        require_non_blank("name_server_domain", domain)?;
        self.apply(SessionOption::NameServerDomain(domain), |config| {
            config.name_server_domain = Some(domain.to_string())
        })
    }

    pub fn set_group_name(&self, group_name: &str) -> Result<()> {
        require_non_blank("group_name", group_name)?;
        self.apply(SessionOption::GroupName(group_name), |config| {
            config.group_name = group_name.to_string()
        })
    }

    pub fn set_instance_name(&self, instance_name: &str) -> Result<()> {
        require_non_blank("instance_name", instance_name)?;
        self.apply(SessionOption::InstanceName(instance_name), |config| {
            config.instance_name = Some(instance_name.to_string())
        })
    }

    /// Applies access key, secret key and channel as one unit.
    pub fn set_session_credentials(
        &self,
        access_key: &str,
        secret_key: &str,
        channel: &str,
    ) -> Result<()> {
        let credentials = SessionCredentials::new(access_key, secret_key, channel)?;
        self.apply_session_credentials(&credentials)
    }

    pub fn apply_session_credentials(&self, credentials: &SessionCredentials) -> Result<()> {
        self.apply(SessionOption::Credentials(credentials), |config| {
            config.credentials = Some(credentials.clone())
        })
    }

    pub fn set_log_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        require_log_path(path)?;
        self.apply(SessionOption::LogPath(path), |config| {
            config.log_path = path.to_path_buf()
        })
    }

    pub fn set_log_file_num_and_size(&self, file_count: i32, file_size: i64) -> Result<()> {
        let (count, size) = check_log_rotation(file_count, file_size)?;
        self.apply(
            SessionOption::LogFileNumAndSize {
                file_count: count,
                file_size: size,
            },
            |config| {
                config.log_rotation = Some(LogRotation {
                    file_count,
                    file_size,
                })
            },
        )
    }

    pub fn set_log_level(&self, level: LogLevel) -> Result<()> {
        require_log_level(level)?;
        self.apply(SessionOption::LogLevel(level), |config| {
            config.log_level = level
        })
    }

    pub fn set_send_timeout(&self, timeout_ms: i32) -> Result<()> {
        let millis = check_send_timeout(timeout_ms)?;
        self.apply(SessionOption::SendTimeout { millis }, |config| {
            config.send_timeout_ms = timeout_ms
        })
    }

    pub fn set_compress_level(&self, level: i32) -> Result<()> {
        let level = check_compress_level(level)?;
        self.apply(SessionOption::CompressLevel(level), |config| {
            config.compress_level = Some(level)
        })
    }

    pub fn set_max_message_size(&self, size: i32) -> Result<()> {
        let bytes = check_max_message_size(size)?;
        self.apply(SessionOption::MaxMessageSize(bytes), |config| {
            config.max_message_size = size
        })
    }

    /// Sets how many extra attempts an orderly send makes. Never reaches the
    /// session and is allowed in every state; the next orderly send reads it.
    pub fn set_auto_retry_times(&self, times: i32) {
        self.auto_retry_times.store(times, Ordering::SeqCst);
    }

    pub fn auto_retry_times(&self) -> i32 {
        self.auto_retry_times.load(Ordering::SeqCst)
    }

    // ---- lifecycle ----

    /// Starts the session.
    ///
    /// Returns `Ok(false)` if the session refused to start; the producer then
    /// stays `Created` and may be started again or destroyed.
    pub fn start(&self) -> Result<bool> {
        let mut inner = self.write();
        let state = inner.state;
        if !state.can_start() {
            return Err(Error::NotStarted { state });
        }
        let session = inner
            .handle
            .get_mut()
            .ok_or(Error::NotStarted { state })?;

        let status = session.start();
        if status.is_ok() {
            inner.state = ProducerState::Started;
            info!(group = %inner.config.group_name, "Producer started");
            Ok(true)
        } else {
            warn!(group = %inner.config.group_name, status = %status, "Producer failed to start");
            Ok(false)
        }
    }

    /// Stops a started session and releases it. Idempotent.
    ///
    /// Returns false if the session reported a non-zero status on the way
    /// down; the session is released regardless.
    pub fn shutdown(&self) -> bool {
        let mut inner = self.write();
        if inner.state.is_released() {
            debug!(state = %inner.state, "Producer already released");
            return true;
        }

        let mut clean = true;
        if inner.state == ProducerState::Started {
            if let Some(session) = inner.handle.get_mut() {
                let status = session.shutdown();
                if !status.is_ok() {
                    warn!(status = %status, "Session shutdown returned non-zero status");
                    clean = false;
                }
            }
        }
        clean &= inner.release();
        inner.state = ProducerState::Shutdown;
        info!(group = %inner.config.group_name, "Producer shut down");
        clean
    }

    /// Releases the session without a graceful shutdown. Idempotent.
    pub fn destroy(&self) -> bool {
        let mut inner = self.write();
        if inner.state.is_released() {
            debug!(state = %inner.state, "Producer already released");
            return true;
        }

        let clean = inner.release();
        inner.state = ProducerState::Destroyed;
        info!(group = %inner.config.group_name, "Producer destroyed");
        clean
    }

    // ---- sends ----

    /// Sends and waits for the broker's acknowledgement.
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    pub fn send_sync(&self, message: &Message) -> Result<SendResult> {
        message.ensure_set()?;
        let inner = self.read();
        let session = inner.sendable()?;

        session.send_sync(message).map_err(|code| {
            warn!(status = %code, "Synchronous send failed");
            Error::SendFailed { code }
        })
    }

    /// Fire-and-forget send. The result carries no offset and no message id.
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    pub fn send_oneway(&self, message: &Message) -> Result<SendOutcome> {
        message.ensure_set()?;
        let inner = self.read();
        let session = inner.sendable()?;

        let status = session.send_oneway(message);
        if status.is_ok() {
            Ok(SendOutcome::Sent(SendResult::oneway()))
        } else {
            warn!(status = %status, "One-way send failed");
            Ok(SendOutcome::Dropped { code: status })
        }
    }

    /// Sends to the queue picked by `selector`, retrying select-and-send up to
    /// [`Producer::auto_retry_times`] more times.
    ///
    /// `arg` is handed to the selector unchanged; `None` is an empty slice.
    /// An index outside `[0, queue count)` is never forwarded. If the final
    /// attempt was such a refused selection, the call returns
    /// [`Error::OutOfRange`]; a session failure on a valid queue is reported
    /// as [`SendOutcome::Dropped`] with its status.
    #[instrument(skip(self, message, selector, arg), fields(topic = %message.topic))]
    pub fn send_orderly(
        &self,
        message: &Message,
        selector: &dyn QueueSelector,
        arg: Option<&[u8]>,
    ) -> Result<SendOutcome> {
        message.ensure_set()?;
        let arg = arg.unwrap_or_default();
        let inner = self.read();
        let session = inner.sendable()?;
        let auto_retry_times = self.auto_retry_times();

        let rejected = Cell::new(None);
        let select = |queue_count: usize, msg: &Message| -> Option<usize> {
            // only the last attempt decides how a failure is reported
            rejected.set(None);
            if queue_count == 0 {
                warn!("Topic reports no queues");
                return None;
            }
            let index = selector.select(queue_count, msg, arg);
            if index < queue_count {
                Some(index)
            } else {
                warn!(index, queue_count, "Selector returned a queue out of range");
                rejected.set(Some(index));
                None
            }
        };

        match session.send_orderly(message, &select, auto_retry_times) {
            Ok(result) => Ok(SendOutcome::Sent(result)),
            Err(code) => {
                if let Some(index) = rejected.get() {
                    return Err(Error::OutOfRange {
                        name: "queue_index",
                        value: i64::try_from(index).unwrap_or(i64::MAX),
                        expected: "0 <= index < queue count",
                    });
                }
                warn!(status = %code, auto_retry_times, "Orderly send failed");
                Ok(SendOutcome::Dropped { code })
            }
        }
    }
}

impl<S: Session> Drop for Producer<S> {
    fn drop(&mut self) {
        if !self.state().is_released() {
            self.shutdown();
        }
    }
}
