use anyhow::{bail, Context};
use base64::Engine;
use broker_dispatch::broker::Destination;
use broker_dispatch::config::BrokerKind;
use broker_dispatch::kafka::KafkaConnectionFactory;
use broker_dispatch::memory::InMemoryBroker;
use broker_dispatch::pool::{ConnectionFactory, ConnectionPool};
use broker_dispatch::{
    Body, Config, DefaultUnitOfWork, Dispatcher, Exchange, HeaderValue, Payload,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "broker-dispatch")]
#[command(about = "Fire-and-forget message dispatch to a broker destination", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "KEY=VALUE",
        help = "Exchange header, repeatable"
    )]
    headers: Vec<String>,

    #[arg(long, help = "Payloads are base64 encoded bytes")]
    base64: bool,

    #[arg(required = true, help = "Message payloads; more than one is sent as a batch")]
    payloads: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting broker-dispatch");
    info!("Loading configuration from {:?}", args.config);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    info!(
        broker_kind = ?config.broker.kind,
        brokers = ?config.broker.brokers,
        destination = %config.endpoint.destination,
        destination_kind = ?config.endpoint.destination_kind,
        transacted = config.endpoint.transacted,
        "Configuration summary"
    );

    let exchange = build_exchange(&args)?;
    let memory = InMemoryBroker::new();
    let factory: Arc<dyn ConnectionFactory> = match config.broker.kind {
        BrokerKind::Memory => Arc::new(memory.clone()),
        BrokerKind::Kafka => Arc::new(KafkaConnectionFactory::new(config.broker.clone())),
    };
    let connections = Arc::new(ConnectionPool::new(
        factory,
        config.pool.max_connections,
        config.pool.borrow_timeout(),
    ));

    let dispatcher = Dispatcher::builder(config.endpoint.clone(), connections.clone())
        .pool_config(config.pool.clone())
        .build()?;
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start();

    let exchange = dispatch(dispatcher.clone(), exchange, config.endpoint.transacted).await?;

    dispatcher.shutdown();
    connections.close();

    if let Some(e) = exchange.exception() {
        error!(exchange_id = %exchange.id(), "Dispatch failed: {}", e);
        bail!("dispatch of exchange {} failed: {}", exchange.id(), e);
    }

    if config.broker.kind == BrokerKind::Memory {
        let destination = Destination::from(&config.endpoint);
        info!(
            %destination,
            delivered = memory.message_count(&destination),
            "In-memory broker contents"
        );
    }

    info!(exchange_id = %exchange.id(), "Dispatch complete");
    Ok(())
}

/// Runs the blocking send off the runtime and waits for the completion
/// callback.
async fn dispatch(
    dispatcher: Arc<Dispatcher>,
    mut exchange: Exchange,
    transacted: bool,
) -> anyhow::Result<Exchange> {
    let (tx, rx) = tokio::sync::oneshot::channel::<bool>();

    let exchange = tokio::task::spawn_blocking(move || {
        let unit_of_work = transacted.then(|| Arc::new(DefaultUnitOfWork::new()));
        if let Some(uow) = &unit_of_work {
            exchange.set_unit_of_work(uow.clone());
        }

        dispatcher.process(
            &mut exchange,
            Box::new(move |synchronous: bool| {
                let _ = tx.send(synchronous);
            }),
        );

        if let Some(uow) = unit_of_work {
            uow.done(&exchange);
        }
        exchange
    })
    .await
    .context("Dispatch task panicked")?;

    let synchronous = rx.await.context("Completion callback was never invoked")?;
    info!(synchronous, "Completion callback fired");
    Ok(exchange)
}

fn build_exchange(args: &Args) -> anyhow::Result<Exchange> {
    let payloads = args
        .payloads
        .iter()
        .map(|raw| {
            if args.base64 {
                base64::engine::general_purpose::STANDARD
                    .decode(raw)
                    .map(Payload::from)
                    .with_context(|| format!("Payload '{}' is not valid base64", raw))
            } else {
                Ok(Payload::from(raw.as_str()))
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let body = if payloads.len() == 1 {
        payloads.into_iter().map(Body::from).next()
    } else {
        Some(Body::batch(payloads))
    };

    let mut exchange = Exchange::new();
    if let Some(body) = body {
        exchange.set_body(body);
    }
    for header in &args.headers {
        let (key, value) = parse_header(header)?;
        exchange.set_header(key, value);
    }
    Ok(exchange)
}

/// `KEY=VALUE`; integer and boolean values keep their type.
fn parse_header(raw: &str) -> anyhow::Result<(String, HeaderValue)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Header '{}' must be KEY=VALUE", raw);
    };
    if key.is_empty() {
        bail!("Header '{}' has an empty key", raw);
    }

    let value = if let Ok(i) = value.parse::<i64>() {
        HeaderValue::Int(i)
    } else if let Ok(b) = value.parse::<bool>() {
        HeaderValue::Bool(b)
    } else {
        HeaderValue::from(value)
    };
    Ok((key.to_string(), value))
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("broker_dispatch=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("broker_dispatch=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
