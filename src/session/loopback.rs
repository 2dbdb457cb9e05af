//! In-process session backed by a shared in-memory broker.
//!
//! [`LoopbackConnector`] hands out [`LoopbackSession`]s that all talk to the
//! same [`Broker`]. The broker keeps per-queue message logs, answers queue
//! counts per topic, records every session call in a journal and can be told
//! to fail upcoming calls with a chosen status code.
//!
//! # Example
//!
//! ```rust
//! use rmq_producer::session::loopback::{LoopbackConnector, Operation};
//! use rmq_producer::{Message, Producer};
//!
//! let connector = LoopbackConnector::new();
//! let producer = Producer::new(&connector, "G1").unwrap();
//! assert!(producer.start().unwrap());
//!
//! connector.broker().fail_next(Operation::SendSync, 11);
//! let err = producer.send_sync(&Message::new("orders", "a")).unwrap_err();
//! assert_eq!(err.code().map(|c| c.raw()), Some(11));
//! ```

use super::{Connector, SelectQueue, Session, SessionOption, StatusCode};
use crate::config::LoopbackConfig;
use crate::message::Message;
use crate::producer::{SendResult, SendStatus};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Status codes produced by the loopback session itself.
pub mod codes {
    pub const NULL_POINTER: i32 = 1;
    pub const SEND_SYNC_FAILED: i32 = 11;
    pub const SEND_ONEWAY_FAILED: i32 = 12;
    pub const SEND_ORDERLY_FAILED: i32 = 13;
}

/// Topic reserved by the cluster for automatic topic creation.
const DEFAULT_TOPIC: &str = "TBW102";
const TOPIC_MAX_LENGTH: usize = 255;
const DEFAULT_MAX_MESSAGE_SIZE: u32 = 4_194_304;

/// Session primitives, as recorded in the journal and targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Configure,
    Start,
    Shutdown,
    Destroy,
    SendSync,
    SendOneway,
    SendOrderly,
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCall {
    pub session: u64,
    pub operation: Operation,
    pub detail: Option<String>,
}

/// A message as stored in a broker queue.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message: Message,
    pub message_id: String,
    pub queue_offset: i64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Default)]
struct BrokerState {
    sessions_created: u64,
    journal: VecDeque<SessionCall>,
    failures: HashMap<Operation, VecDeque<StatusCode>>,
    queue_counts: HashMap<String, usize>,
    queues: BTreeMap<(String, usize), Vec<StoredMessage>>,
    round_robin: HashMap<String, usize>,
    commit_offset: u64,
}

/// Shared in-memory broker.
///
/// The journal keeps only the most recent `journal_capacity` calls.
pub struct Broker {
    default_queue_count: usize,
    journal_capacity: usize,
    state: Mutex<BrokerState>,
}

impl Broker {
    pub fn new(default_queue_count: usize) -> Self {
        Self {
            default_queue_count,
            journal_capacity: LoopbackConfig::default().journal_capacity,
            state: Mutex::new(BrokerState::default()),
        }
    }

    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    pub fn from_config(config: &LoopbackConfig) -> Self {
        let broker =
            Self::new(config.default_queue_count).with_journal_capacity(config.journal_capacity);
        for (topic, count) in &config.topics {
            broker.set_queue_count(topic, *count);
        }
        broker
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_queue_count(&self, topic: &str, count: usize) {
        self.lock().queue_counts.insert(topic.to_string(), count);
    }

    pub fn queue_count(&self, topic: &str) -> usize {
        self.lock()
            .queue_counts
            .get(topic)
            .copied()
            .unwrap_or(self.default_queue_count)
    }

    /// Makes the next call of `operation` return `code` instead of running.
    pub fn fail_next(&self, operation: Operation, code: i32) {
        self.fail_times(operation, code, 1);
    }

    pub fn fail_times(&self, operation: Operation, code: i32, times: usize) {
        let mut state = self.lock();
        let queue = state.failures.entry(operation).or_default();
        queue.extend(std::iter::repeat(StatusCode::from(code)).take(times));
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().journal.iter().cloned().collect()
    }

    pub fn count_calls(&self, operation: Operation) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn sessions_created(&self) -> u64 {
        self.lock().sessions_created
    }

    pub fn messages(&self, topic: &str, queue: usize) -> Vec<StoredMessage> {
        self.lock()
            .queues
            .get(&(topic.to_string(), queue))
            .cloned()
            .unwrap_or_default()
    }

    fn note(&self, session: u64, operation: Operation, detail: Option<String>) {
        let mut state = self.lock();
        state.journal.push_back(SessionCall {
            session,
            operation,
            detail,
        });
        while state.journal.len() > self.journal_capacity {
            state.journal.pop_front();
        }
    }

    /// Journals the call and returns an injected failure, if one is pending.
    fn record(&self, session: u64, operation: Operation, detail: Option<String>) -> StatusCode {
        self.note(session, operation, detail);
        self.lock()
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or(StatusCode::OK)
    }

    fn next_queue(&self, topic: &str) -> usize {
        let count = self.queue_count(topic).max(1);
        let mut state = self.lock();
        let cursor = state.round_robin.entry(topic.to_string()).or_insert(0);
        let queue = *cursor % count;
        *cursor = cursor.wrapping_add(1);
        queue
    }

    fn store(&self, queue: usize, message: &Message) -> SendResult {
        let mut state = self.lock();
        let commit_offset = state.commit_offset;
        state.commit_offset += message.body.len() as u64;

        let log = state
            .queues
            .entry((message.topic.clone(), queue))
            .or_default();
        let queue_offset = log.len() as i64;
        // 127.0.0.1:10911 followed by the commit log offset
        let message_id = format!("7F00000100002A9F{:016X}", commit_offset);
        log.push(StoredMessage {
            message: message.clone(),
            message_id: message_id.clone(),
            queue_offset,
            stored_at: Utc::now(),
        });
        debug!(
            topic = %message.topic,
            queue,
            queue_offset,
            "Stored message"
        );

        SendResult {
            status: SendStatus::Ok,
            offset: queue_offset,
            message_id,
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(LoopbackConfig::default().default_queue_count)
    }
}

/// Creates [`LoopbackSession`]s attached to one shared [`Broker`].
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    broker: Arc<Broker>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }
}

impl Connector for LoopbackConnector {
    type Session = LoopbackSession;

    fn connect(&self, group_name: &str) -> Result<LoopbackSession, StatusCode> {
        let status = self.broker.record(0, Operation::Connect, Some(group_name.to_string()));
        if !status.is_ok() {
            return Err(status);
        }

        let id = {
            let mut state = self.broker.lock();
            state.sessions_created += 1;
            state.sessions_created
        };
        debug!(session = id, group = %group_name, "Created loopback session");

        Ok(LoopbackSession {
            id,
            broker: self.broker.clone(),
            group_name: group_name.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            started: false,
        })
    }
}

/// A session whose sends land in the shared [`Broker`].
pub struct LoopbackSession {
    id: u64,
    broker: Arc<Broker>,
    group_name: String,
    max_message_size: u32,
    started: bool,
}

impl LoopbackSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Client-side checks the cluster client runs before a message leaves the process.
    fn accepts(&self, message: &Message) -> bool {
        let topic = message.topic.trim();
        if topic.is_empty() || topic.len() > TOPIC_MAX_LENGTH || topic == DEFAULT_TOPIC {
            warn!(topic = %message.topic, "Loopback session refused topic");
            return false;
        }
        if message.body.is_empty() || message.body.len() > self.max_message_size as usize {
            warn!(
                size = message.body.len(),
                max = self.max_message_size,
                "Loopback session refused message body"
            );
            return false;
        }
        true
    }
}

impl Session for LoopbackSession {
    fn configure(&mut self, option: &SessionOption<'_>) -> StatusCode {
        let status = self
            .broker
            .record(self.id, Operation::Configure, Some(format!("{:?}", option)));
        if !status.is_ok() {
            return status;
        }
        match option {
            SessionOption::GroupName(name) => self.group_name = name.to_string(),
            SessionOption::MaxMessageSize(size) => self.max_message_size = *size,
            _ => {}
        }
        StatusCode::OK
    }

    fn start(&mut self) -> StatusCode {
        let status = self.broker.record(self.id, Operation::Start, None);
        if status.is_ok() {
            self.started = true;
        }
        status
    }

    fn shutdown(&mut self) -> StatusCode {
        let status = self.broker.record(self.id, Operation::Shutdown, None);
        self.started = false;
        status
    }

    fn destroy(&mut self) -> StatusCode {
        self.started = false;
        self.broker.record(self.id, Operation::Destroy, None)
    }

    fn send_sync(&self, message: &Message) -> Result<SendResult, StatusCode> {
        let status = self.broker.record(self.id, Operation::SendSync, None);
        if !status.is_ok() {
            return Err(status);
        }
        if !self.started || !self.accepts(message) {
            return Err(StatusCode::from(codes::SEND_SYNC_FAILED));
        }
        let queue = self.broker.next_queue(&message.topic);
        Ok(self.broker.store(queue, message))
    }

    fn send_oneway(&self, message: &Message) -> StatusCode {
        let status = self.broker.record(self.id, Operation::SendOneway, None);
        if !status.is_ok() {
            return status;
        }
        if !self.started || !self.accepts(message) {
            return StatusCode::from(codes::SEND_ONEWAY_FAILED);
        }
        let queue = self.broker.next_queue(&message.topic);
        self.broker.store(queue, message);
        StatusCode::OK
    }

    fn send_orderly(
        &self,
        message: &Message,
        select: &SelectQueue<'_>,
        auto_retry_times: i32,
    ) -> Result<SendResult, StatusCode> {
        let failed = StatusCode::from(codes::SEND_ORDERLY_FAILED);
        if !self.started || !self.accepts(message) {
            self.broker.note(self.id, Operation::SendOrderly, None);
            return Err(failed);
        }

        let attempts = 1 + auto_retry_times.max(0) as usize;
        let mut last = failed;
        for attempt in 0..attempts {
            let queue_count = self.broker.queue_count(&message.topic);
            let queue = match select(queue_count, message) {
                Some(queue) if queue < queue_count => queue,
                _ => {
                    debug!(attempt, queue_count, "Queue selection refused");
                    self.broker.note(
                        self.id,
                        Operation::SendOrderly,
                        Some("selection refused".to_string()),
                    );
                    last = failed;
                    continue;
                }
            };

            let status = self.broker.record(
                self.id,
                Operation::SendOrderly,
                Some(format!("queue {}", queue)),
            );
            if status.is_ok() {
                return Ok(self.broker.store(queue, message));
            }
            debug!(attempt, status = %status, "Orderly send attempt failed");
            last = status;
        }
        Err(last)
    }
}
