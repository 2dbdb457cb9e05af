pub mod config;
pub mod error;
pub mod message;
pub mod producer;
pub mod session;

pub use config::{Config, LogLevel, ProducerConfig, SessionCredentials};
pub use error::{Error, Result};
pub use message::Message;
pub use producer::{
    FirstQueueSelector, HashQueueSelector, Producer, ProducerBuilder, ProducerState,
    QueueSelector, SendOutcome, SendResult, SendStatus,
};
pub use session::loopback::LoopbackConnector;
pub use session::{Connector, Session, StatusCode};
