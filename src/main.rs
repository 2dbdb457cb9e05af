use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use rmq_producer::session::loopback::{Broker, LoopbackConnector};
use rmq_producer::{Config, HashQueueSelector, Message, Producer, ProducerConfig, SendOutcome};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "rmq-producer")]
#[command(about = "Send messages through a message-queue producer", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", help = "Producer configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        default_value = "rmq-producer",
        help = "Producer group when no config file is given"
    )]
    group: String,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(short, long)]
    topic: String,

    #[arg(short, long, value_enum, default_value_t = Mode::Sync)]
    mode: Mode,

    #[arg(short = 'n', long, default_value_t = 1)]
    count: u64,

    #[arg(short, long, conflicts_with = "body_base64")]
    body: Option<String>,

    #[arg(long, help = "Message body as standard base64")]
    body_base64: Option<String>,

    #[arg(long)]
    tags: Option<String>,

    #[arg(long)]
    keys: Option<String>,

    #[arg(long, help = "Orderly mode: messages with the same shard key share a queue")]
    shard_key: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Sync,
    Oneway,
    Orderly,
}

#[derive(Serialize)]
struct Report<'a> {
    seq: u64,
    mode: Mode,
    topic: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting rmq-producer");

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path).map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?
        }
        None => Config {
            producer: ProducerConfig::new(args.group.clone()),
            loopback: Default::default(),
        },
    };

    info!(
        group = %config.producer.group_name,
        name_server = ?config.producer.name_server_address,
        log_level = %config.producer.log_level,
        send_timeout_ms = config.producer.send_timeout_ms,
        auto_retry_times = config.producer.auto_retry_times,
        "Configuration summary"
    );

    let body = message_body(&args)?;
    let broker = Arc::new(Broker::from_config(&config.loopback));
    let connector = LoopbackConnector::with_broker(broker);
    let producer = Arc::new(
        Producer::from_config(&connector, &config.producer)
            .context("failed to create producer")?,
    );
    if !producer.start().context("failed to start producer")? {
        bail!("producer session refused to start");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut sender = {
        let producer = Arc::clone(&producer);
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || send_loop(&*producer, &args, body, &stop))
    };

    let finished = tokio::select! {
        joined = &mut sender => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            info!("Received shutdown signal, stopping sends");
            stop.store(true, Ordering::SeqCst);
            sender.await
        }
    };
    let sent = joined??;

    if !producer.shutdown() {
        warn!("Producer shut down with errors");
    }
    info!(sent, "Producer stopped");
    Ok(())
}

fn message_body(args: &Args) -> anyhow::Result<Bytes> {
    match (&args.body, &args.body_base64) {
        (Some(text), _) => Ok(Bytes::from(text.clone())),
        (None, Some(encoded)) => {
            let decoded = STANDARD
                .decode(encoded)
                .context("--body-base64 is not valid base64")?;
            Ok(Bytes::from(decoded))
        }
        (None, None) => bail!("one of --body or --body-base64 is required"),
    }
}

fn send_loop<S: rmq_producer::Session>(
    producer: &Producer<S>,
    args: &Args,
    body: Bytes,
    stop: &AtomicBool,
) -> anyhow::Result<u64> {
    let mut message = Message::new(args.topic.clone(), body);
    if let Some(tags) = &args.tags {
        message = message.with_tags(tags.clone());
    }
    if let Some(keys) = &args.keys {
        message = message.with_keys(keys.clone());
    }
    let shard_key = args.shard_key.as_deref().map(str::as_bytes);

    let mut sent = 0;
    for seq in 0..args.count {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let outcome = match args.mode {
            Mode::Sync => producer.send_sync(&message).map(SendOutcome::Sent),
            Mode::Oneway => producer.send_oneway(&message),
            Mode::Orderly => producer.send_orderly(&message, &HashQueueSelector, shard_key),
        };

        let report = match &outcome {
            Ok(SendOutcome::Sent(result)) => {
                sent += 1;
                Report {
                    seq,
                    mode: args.mode,
                    topic: &args.topic,
                    status: "sent",
                    offset: Some(result.offset),
                    message_id: Some(result.message_id.as_str()),
                    code: None,
                    error: None,
                }
            }
            Ok(SendOutcome::Dropped { code }) => Report {
                seq,
                mode: args.mode,
                topic: &args.topic,
                status: "dropped",
                offset: None,
                message_id: None,
                code: Some(code.raw()),
                error: None,
            },
            Err(e) => Report {
                seq,
                mode: args.mode,
                topic: &args.topic,
                status: "failed",
                offset: None,
                message_id: None,
                code: e.code().map(|c| c.raw()),
                error: Some(e.to_string()),
            },
        };
        println!("{}", serde_json::to_string(&report)?);

        if let Err(e) = outcome {
            if e.is_caller_error() {
                return Err(e.into());
            }
        }
    }
    Ok(sent)
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("rmq_producer=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rmq_producer=info,warn"))
    };

    // stdout carries the JSON reports, so logs go to stderr
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
