use anyhow::{Context, Result};
use clap::Parser;
use lotto_server::{config, scheduler, Api, DrawService, DrawStore, ServerConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "lotto-server".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("lotto-server");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host interface to bind.
    #[arg(long)]
    host: Option<IpAddr>,

    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database holding tickets, sellers and results.
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Business-day offset from UTC in minutes (default: 330).
    #[arg(long, allow_negative_numbers = true)]
    utc_offset_minutes: Option<i32>,

    /// Tickets loaded per aggregation batch.
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    aggregation_timeout_ms: Option<u64>,

    #[arg(long)]
    execution_timeout_ms: Option<u64>,

    #[arg(long)]
    lock_ttl_ms: Option<u64>,

    /// Random filler attempts per prefix before scanning.
    #[arg(long)]
    filler_retry_limit: Option<usize>,

    /// `uniform`, or a fixed strategy such as `lowest_winning`.
    #[arg(long)]
    strategy_policy: Option<String>,

    /// Run the built-in draw scheduler (default: true).
    #[arg(long, value_parser = clap::value_parser!(bool))]
    scheduler_enabled: Option<bool>,

    #[arg(long)]
    scheduler_tick_ms: Option<u64>,

    /// Seed for reproducible draws (optional).
    #[arg(long)]
    deterministic_seed: Option<u64>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let base = match &args.config {
        Some(path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };
    let strategy_policy = match args.strategy_policy.as_deref() {
        Some(raw) => config::parse_strategy_policy(raw)?,
        None => base.strategy_policy,
    };
    let config = ServerConfig {
        host: args.host.unwrap_or(base.host),
        port: args.port.unwrap_or(base.port),
        database_path: args
            .database_path
            .clone()
            .unwrap_or_else(|| base.database_path.clone()),
        utc_offset_minutes: args.utc_offset_minutes.unwrap_or(base.utc_offset_minutes),
        batch_size: args.batch_size.unwrap_or(base.batch_size),
        aggregation_timeout_ms: args
            .aggregation_timeout_ms
            .unwrap_or(base.aggregation_timeout_ms),
        execution_timeout_ms: args
            .execution_timeout_ms
            .unwrap_or(base.execution_timeout_ms),
        lock_ttl_ms: args.lock_ttl_ms.unwrap_or(base.lock_ttl_ms),
        filler_retry_limit: args.filler_retry_limit.unwrap_or(base.filler_retry_limit),
        strategy_policy,
        scheduler_enabled: args.scheduler_enabled.unwrap_or(base.scheduler_enabled),
        scheduler_tick_ms: args.scheduler_tick_ms.unwrap_or(base.scheduler_tick_ms),
        deterministic_seed: args.deterministic_seed.or(base.deterministic_seed),
        http_body_limit_bytes: args
            .http_body_limit_bytes
            .unwrap_or(base.http_body_limit_bytes),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let config = build_config(&args)?;
    let clock = config.clock()?;
    let store = DrawStore::open(&config.database_path).with_context(|| {
        format!("open draw database {}", config.database_path.display())
    })?;
    info!(
        path = %config.database_path.display(),
        utc_offset_minutes = config.utc_offset_minutes,
        strategy_policy = %config.strategy_policy,
        deterministic = config.deterministic_seed.is_some(),
        "draw store opened"
    );

    let addr = SocketAddr::new(config.host, config.port);
    let config = Arc::new(config);
    let service = Arc::new(DrawService::new(store, config.clone(), clock));

    if config.scheduler_enabled {
        scheduler::spawn(
            service.clone(),
            clock,
            Duration::from_millis(config.scheduler_tick_ms),
        );
    } else {
        info!("draw scheduler disabled");
    }

    let app = Api::new(service).router();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "lotto server listening");
    axum::serve(listener, app).await.context("serve http")?;
    Ok(())
}
