#![allow(dead_code)]

use rmq_producer::session::loopback::{Broker, LoopbackConnector, LoopbackSession};
use rmq_producer::{LogLevel, Producer, ProducerBuilder, ProducerConfig};
use std::env;
use std::sync::Arc;

/// Producer configuration for tests; the group can be overridden with `TEST_PRODUCER_GROUP`.
pub fn test_config() -> ProducerConfig {
    let group = env::var("TEST_PRODUCER_GROUP")
        .unwrap_or_else(|_| format!("test_group_{}", std::process::id()));

    let mut config = ProducerConfig::new(group);
    config.name_server_address = Some("127.0.0.1:9876".to_string());
    config.log_path = env::temp_dir().join(format!("producer_log_{}.txt", std::process::id()));
    config.log_level = LogLevel::Debug;
    config.send_timeout_ms = 1000;
    config
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("rmq_producer=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Connector over a fresh broker with `queue_count` queues per topic.
pub fn connector_with_queues(queue_count: usize) -> LoopbackConnector {
    LoopbackConnector::with_broker(Arc::new(Broker::new(queue_count)))
}

pub fn started_producer(connector: &LoopbackConnector) -> Producer<LoopbackSession> {
    let producer = ProducerBuilder::from_config(test_config())
        .build(connector)
        .unwrap();
    assert!(producer.start().unwrap(), "producer failed to start");
    producer
}
