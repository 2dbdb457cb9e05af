#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{LogLevel, ProducerConfig};
    use crate::message::Message;
    use crate::session::loopback::{LoopbackConnector, LoopbackSession, Operation};
    use crate::Error;
    use std::cell::RefCell;
    use std::sync::Arc;

    fn create_test_producer(connector: &LoopbackConnector) -> Producer<LoopbackSession> {
        Producer::new(connector, "G1").unwrap()
    }

    fn started_producer(connector: &LoopbackConnector) -> Producer<LoopbackSession> {
        let producer = create_test_producer(connector);
        assert!(producer.start().unwrap());
        producer
    }

    fn configure_details(connector: &LoopbackConnector) -> Vec<String> {
        connector
            .broker()
            .calls()
            .into_iter()
            .filter(|call| call.operation == Operation::Configure)
            .filter_map(|call| call.detail)
            .collect()
    }

    fn test_message() -> Message {
        Message::new("orders", "order created").with_keys("order-1001")
    }

    #[test]
    fn test_blank_group_allocates_nothing() {
        let connector = LoopbackConnector::new();

        for group in ["", "   ", "\t\n"] {
            match Producer::new(&connector, group) {
                Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "group_name"),
                Err(e) => panic!("expected InvalidArgument, got {}", e),
                Ok(_) => panic!("blank group {:?} accepted", group),
            }
        }
        assert_eq!(connector.broker().sessions_created(), 0);
        assert!(connector.broker().calls().is_empty());
    }

    #[test]
    fn test_defaults_applied_in_order() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);

        let details = configure_details(&connector);
        assert_eq!(details.len(), 4);
        assert!(details[0].starts_with("LogPath("));
        assert_eq!(details[1], "LogLevel(Trace)");
        assert_eq!(details[2], "SendTimeout { millis: 3000 }");
        assert_eq!(details[3], "MaxMessageSize(4194304)");

        let config = producer.config();
        assert_eq!(config.group_name, "G1");
        assert_eq!(config.send_timeout_ms, 3000);
        assert_eq!(config.auto_retry_times, 2);
        assert_eq!(producer.state(), ProducerState::Created);
    }

    #[test]
    fn test_session_creation_failure() {
        let connector = LoopbackConnector::new();
        connector.broker().fail_next(Operation::Connect, 2);

        match Producer::new(&connector, "G1") {
            Err(Error::SessionCreationFailed { code }) => assert_eq!(code.raw(), 2),
            Err(e) => panic!("expected SessionCreationFailed, got {}", e),
            Ok(_) => panic!("producer created despite connect failure"),
        }
    }

    #[test]
    fn test_rejected_default_releases_session() {
        let connector = LoopbackConnector::new();
        connector.broker().fail_next(Operation::Configure, 9);

        match Producer::new(&connector, "G1") {
            Err(Error::ConfigurationRejected { option, code }) => {
                assert_eq!(option, "log_path");
                assert_eq!(code.raw(), 9);
            }
            Err(e) => panic!("expected ConfigurationRejected, got {}", e),
            Ok(_) => panic!("producer created despite rejected option"),
        }
        assert_eq!(connector.broker().count_calls(Operation::Destroy), 1);
        assert_eq!(connector.broker().count_calls(Operation::Shutdown), 0);
    }

    #[test]
    fn test_negative_send_timeout_keeps_previous_value() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);
        let before = connector.broker().count_calls(Operation::Configure);

        match producer.set_send_timeout(-1) {
            Err(Error::OutOfRange { name, value, .. }) => {
                assert_eq!(name, "send_timeout_ms");
                assert_eq!(value, -1);
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
        assert_eq!(producer.config().send_timeout_ms, 3000);
        assert_eq!(connector.broker().count_calls(Operation::Configure), before);

        producer.set_send_timeout(0).unwrap();
        assert_eq!(producer.config().send_timeout_ms, 0);
    }

    #[test]
    fn test_log_level_none_never_reaches_session() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);
        let before = connector.broker().calls().len();

        assert!(matches!(
            producer.set_log_level(LogLevel::None),
            Err(Error::InvalidArgument { name: "log_level", .. })
        ));
        assert_eq!(connector.broker().calls().len(), before);
        assert_eq!(producer.config().log_level, LogLevel::Trace);
    }

    #[test]
    fn test_invalid_setter_arguments() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);
        let before = connector.broker().calls().len();

        assert!(matches!(
            producer.set_name_server_address(" "),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(producer.set_name_server_domain("").is_err());
        assert!(producer.set_group_name("").is_err());
        assert!(producer.set_instance_name("\t").is_err());
        assert!(producer.set_log_path("").is_err());
        assert!(matches!(
            producer.set_session_credentials("ak", "", "channel"),
            Err(Error::InvalidArgument { name: "secret_key", .. })
        ));
        assert!(matches!(
            producer.set_log_file_num_and_size(0, 1024),
            Err(Error::OutOfRange { .. })
        ));
        assert!(producer.set_log_file_num_and_size(3, -1).is_err());
        assert!(matches!(
            producer.set_compress_level(10),
            Err(Error::OutOfRange { .. })
        ));
        assert!(producer.set_max_message_size(-1).is_err());

        assert_eq!(connector.broker().calls().len(), before);
        assert!(producer.config().credentials.is_none());
    }

    #[test]
    fn test_setters_update_snapshot() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);

        producer.set_name_server_address("127.0.0.1:9876").unwrap();
        producer.set_name_server_domain("nameserver.example.com").unwrap();
        producer.set_instance_name("instance-a").unwrap();
        producer.set_group_name("G2").unwrap();
        producer.set_session_credentials("ak", "sk", "ALIYUN").unwrap();
        producer.set_log_file_num_and_size(3, 1 << 20).unwrap();
        producer.set_compress_level(-1).unwrap();
        producer.set_max_message_size(1024).unwrap();

        let config = producer.config();
        assert_eq!(config.name_server_address.as_deref(), Some("127.0.0.1:9876"));
        assert_eq!(config.name_server_domain.as_deref(), Some("nameserver.example.com"));
        assert_eq!(config.instance_name.as_deref(), Some("instance-a"));
        assert_eq!(config.group_name, "G2");
        assert_eq!(producer.group_name(), "G2");
        assert_eq!(config.credentials.unwrap().access_key(), "ak");
        assert_eq!(config.log_rotation.unwrap().file_count, 3);
        assert_eq!(config.compress_level, Some(-1));
        assert_eq!(config.max_message_size, 1024);
    }

    #[test]
    fn test_rejected_option_carries_code() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);
        connector.broker().fail_next(Operation::Configure, 5);

        match producer.set_instance_name("instance-a") {
            Err(err @ Error::ConfigurationRejected { .. }) => {
                assert_eq!(err.code().map(|c| c.raw()), Some(5));
                assert!(!err.is_caller_error());
            }
            other => panic!("expected ConfigurationRejected, got {:?}", other),
        }
        assert!(producer.config().instance_name.is_none());
    }

    #[test]
    fn test_start_twice_is_not_started() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);

        assert!(matches!(
            producer.start(),
            Err(Error::NotStarted {
                state: ProducerState::Started
            })
        ));
        assert_eq!(connector.broker().count_calls(Operation::Start), 1);
    }

    #[test]
    fn test_failed_start_can_be_retried() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);
        connector.broker().fail_next(Operation::Start, 10);

        assert!(!producer.start().unwrap());
        assert_eq!(producer.state(), ProducerState::Created);
        assert!(producer.start().unwrap());
        assert_eq!(producer.state(), ProducerState::Started);
    }

    #[test]
    fn test_send_before_start() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);

        assert!(matches!(
            producer.send_sync(&test_message()),
            Err(Error::NotStarted {
                state: ProducerState::Created
            })
        ));
        assert!(producer.send_oneway(&test_message()).is_err());
        assert!(producer
            .send_orderly(&test_message(), producer.default_selector(), None)
            .is_err());
        assert_eq!(connector.broker().count_calls(Operation::SendSync), 0);
    }

    #[test]
    fn test_options_frozen_after_start() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        let before = connector.broker().count_calls(Operation::Configure);

        assert!(matches!(
            producer.set_send_timeout(1000),
            Err(Error::InvalidState {
                state: ProducerState::Started,
                ..
            })
        ));
        assert_eq!(connector.broker().count_calls(Operation::Configure), before);

        producer.set_auto_retry_times(7);
        assert_eq!(producer.auto_retry_times(), 7);
    }

    #[test]
    fn test_shutdown_and_destroy_are_idempotent() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);

        assert!(producer.shutdown());
        assert_eq!(producer.state(), ProducerState::Shutdown);
        assert!(producer.shutdown());
        assert!(producer.destroy());
        assert_eq!(producer.state(), ProducerState::Shutdown);

        assert_eq!(connector.broker().count_calls(Operation::Shutdown), 1);
        assert_eq!(connector.broker().count_calls(Operation::Destroy), 1);

        let other = create_test_producer(&connector);
        assert!(other.destroy());
        assert!(other.destroy());
        assert_eq!(other.state(), ProducerState::Destroyed);
        assert_eq!(connector.broker().count_calls(Operation::Destroy), 2);
        assert_eq!(connector.broker().count_calls(Operation::Shutdown), 1);
    }

    #[test]
    fn test_shutdown_reports_unclean_stop() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        connector.broker().fail_next(Operation::Shutdown, 4);

        assert!(!producer.shutdown());
        assert_eq!(producer.state(), ProducerState::Shutdown);
        assert_eq!(connector.broker().count_calls(Operation::Destroy), 1);
        assert!(producer.shutdown());
    }

    #[test]
    fn test_send_after_shutdown() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        assert!(producer.shutdown());

        assert!(matches!(
            producer.send_sync(&test_message()),
            Err(Error::NotStarted {
                state: ProducerState::Shutdown
            })
        ));
        assert!(matches!(
            producer.set_instance_name("late"),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(producer.start(), Err(Error::NotStarted { .. })));
    }

    #[test]
    fn test_drop_shuts_down_started_producer() {
        let connector = LoopbackConnector::new();
        {
            let _producer = started_producer(&connector);
        }
        assert_eq!(connector.broker().count_calls(Operation::Shutdown), 1);
        assert_eq!(connector.broker().count_calls(Operation::Destroy), 1);
    }

    #[test]
    fn test_unset_message_rejected_first() {
        let connector = LoopbackConnector::new();
        let producer = create_test_producer(&connector);

        assert!(matches!(
            producer.send_sync(&Message::default()),
            Err(Error::InvalidArgument { name: "message", .. })
        ));
        assert!(matches!(
            producer.send_oneway(&Message::new("orders", "")),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            producer.send_orderly(&Message::new("", "x"), &FirstQueueSelector, None),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_sync_send() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);

        let result = producer.send_sync(&test_message()).unwrap();
        assert_eq!(result.status, SendStatus::Ok);
        assert_eq!(result.offset, 0);
        assert!(!result.message_id.is_empty());
    }

    #[test]
    fn test_sync_send_failure_raises() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        connector.broker().fail_next(Operation::SendSync, 11);

        match producer.send_sync(&test_message()) {
            Err(Error::SendFailed { code }) => assert_eq!(code.raw(), 11),
            other => panic!("expected SendFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_oneway_send() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);

        let outcome = producer.send_oneway(&test_message()).unwrap();
        let result = outcome.into_result().unwrap();
        assert_eq!(result.status, SendStatus::Ok);
        assert_eq!(result.offset, 0);
        assert_eq!(result.message_id, "");

        connector.broker().fail_next(Operation::SendOneway, 12);
        let outcome = producer.send_oneway(&test_message()).unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Dropped {
                code: crate::StatusCode::from(12)
            }
        );
    }

    #[test]
    fn test_orderly_send_uses_selector() {
        let connector = LoopbackConnector::new();
        connector.broker().set_queue_count("orders", 8);
        let producer = started_producer(&connector);

        let seen = RefCell::new(Vec::new());
        let selector = |count: usize, _: &Message, arg: &[u8]| {
            seen.borrow_mut().push((count, arg.to_vec()));
            3
        };
        let outcome = producer
            .send_orderly(&test_message(), &selector, Some(b"order-1001".as_slice()))
            .unwrap();

        assert!(outcome.is_sent());
        assert_eq!(*seen.borrow(), vec![(8, b"order-1001".to_vec())]);
        assert_eq!(connector.broker().messages("orders", 3).len(), 1);
    }

    #[test]
    fn test_orderly_arg_defaults_to_empty() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);

        let selector = |_: usize, _: &Message, arg: &[u8]| {
            assert!(arg.is_empty());
            0
        };
        assert!(producer
            .send_orderly(&test_message(), &selector, None)
            .unwrap()
            .is_sent());
    }

    #[test]
    fn test_orderly_out_of_range_selection_rejected() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);

        let selector = |count: usize, _: &Message, _: &[u8]| count;
        match producer.send_orderly(&test_message(), &selector, None) {
            Err(Error::OutOfRange { name, value, .. }) => {
                assert_eq!(name, "queue_index");
                assert_eq!(value, 4);
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
        for queue in 0..4 {
            assert!(connector.broker().messages("orders", queue).is_empty());
        }
    }

    #[test]
    fn test_orderly_failure_after_valid_retry_keeps_session_code() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        producer.set_auto_retry_times(1);
        connector.broker().fail_times(Operation::SendOrderly, 13, 1);

        let calls = std::cell::Cell::new(0);
        let selector = |count: usize, _: &Message, _: &[u8]| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                count
            } else {
                0
            }
        };
        let outcome = producer
            .send_orderly(&test_message(), &selector, None)
            .unwrap();

        assert_eq!(
            outcome,
            SendOutcome::Dropped {
                code: crate::StatusCode::from(13)
            }
        );
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_orderly_valid_failure_then_refused_retry_is_out_of_range() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        producer.set_auto_retry_times(1);
        connector.broker().fail_times(Operation::SendOrderly, 13, 1);

        let calls = std::cell::Cell::new(0);
        let selector = |count: usize, _: &Message, _: &[u8]| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                0
            } else {
                count
            }
        };
        assert!(matches!(
            producer.send_orderly(&test_message(), &selector, None),
            Err(Error::OutOfRange {
                name: "queue_index",
                ..
            })
        ));
    }

    #[test]
    fn test_orderly_never_selects_from_zero_queues() {
        let connector = LoopbackConnector::new();
        connector.broker().set_queue_count("orders", 0);
        let producer = started_producer(&connector);

        let selector = |_: usize, _: &Message, _: &[u8]| -> usize {
            panic!("selector called without queues");
        };
        let outcome = producer
            .send_orderly(&test_message(), &selector, None)
            .unwrap();
        assert!(!outcome.is_sent());
    }

    #[test]
    fn test_auto_retry_times_read_by_next_orderly_send() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        let before = connector.broker().calls().len();

        producer.set_auto_retry_times(0);
        producer.set_auto_retry_times(-3);
        assert_eq!(connector.broker().calls().len(), before);
        assert_eq!(producer.config().auto_retry_times, -3);

        connector.broker().fail_times(Operation::SendOrderly, 13, 10);
        let outcome = producer
            .send_orderly(&test_message(), producer.default_selector(), None)
            .unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Dropped {
                code: crate::StatusCode::from(13)
            }
        );
        assert_eq!(connector.broker().count_calls(Operation::SendOrderly), 1);

        producer.set_auto_retry_times(3);
        assert!(producer
            .send_orderly(&test_message(), producer.default_selector(), None)
            .unwrap()
            .into_sent()
            .is_err());
        assert_eq!(connector.broker().count_calls(Operation::SendOrderly), 5);
    }

    #[test]
    fn test_orderly_retry_recovers() {
        let connector = LoopbackConnector::new();
        let producer = started_producer(&connector);
        connector.broker().fail_times(Operation::SendOrderly, 13, 2);

        let outcome = producer
            .send_orderly(&test_message(), producer.default_selector(), None)
            .unwrap();
        let result = outcome.into_sent().unwrap();
        assert_eq!(result.offset, 0);
        assert_eq!(connector.broker().messages("orders", 0).len(), 1);
        assert_eq!(connector.broker().count_calls(Operation::SendOrderly), 3);
    }

    #[test]
    fn test_concurrent_sends() {
        let connector = LoopbackConnector::new();
        let producer = Arc::new(started_producer(&connector));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let producer = Arc::clone(&producer);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let message = Message::new("orders", format!("{}-{}", worker, i));
                        producer.send_sync(&message).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored: usize = (0..4)
            .map(|queue| connector.broker().messages("orders", queue).len())
            .sum();
        assert_eq!(stored, 100);
        assert!(producer.shutdown());
    }

    #[test]
    fn test_builder_applies_constructor_options_after_defaults() {
        let connector = LoopbackConnector::new();
        let producer = ProducerBuilder::new("G1")
            .name_server_address("127.0.0.1:9876")
            .log_path("/tmp/custom.log")
            .log_level(LogLevel::Info)
            .auto_retry_times(5)
            .build(&connector)
            .unwrap();

        let details = configure_details(&connector);
        assert_eq!(details.len(), 7);
        assert!(details[0].starts_with("LogPath("));
        assert!(!details[0].contains("custom.log"));
        assert_eq!(details[1], "LogLevel(Trace)");
        assert_eq!(details[2], "SendTimeout { millis: 3000 }");
        assert_eq!(details[3], "MaxMessageSize(4194304)");
        assert_eq!(details[4], "NameServerAddress(\"127.0.0.1:9876\")");
        assert_eq!(details[5], "LogPath(\"/tmp/custom.log\")");
        assert_eq!(details[6], "LogLevel(Info)");

        let config = producer.config();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_path, std::path::PathBuf::from("/tmp/custom.log"));
        assert_eq!(producer.auto_retry_times(), 5);
    }

    #[test]
    fn test_from_config_applies_changed_limits_after_defaults() {
        let connector = LoopbackConnector::new();
        let mut config = ProducerConfig::new("G1");
        config.send_timeout_ms = 1000;
        config.max_message_size = 1024;
        Producer::from_config(&connector, &config).unwrap();

        let details = configure_details(&connector);
        assert_eq!(details[2], "SendTimeout { millis: 3000 }");
        assert_eq!(details[4], "SendTimeout { millis: 1000 }");
        assert_eq!(details[5], "MaxMessageSize(1024)");
    }

    #[test]
    fn test_from_config_validates_before_connecting() {
        let connector = LoopbackConnector::new();
        let mut config = ProducerConfig::new("G1");
        config.compress_level = Some(12);

        assert!(matches!(
            Producer::from_config(&connector, &config),
            Err(Error::OutOfRange {
                name: "compress_level",
                ..
            })
        ));
        assert_eq!(connector.broker().sessions_created(), 0);
    }
}
