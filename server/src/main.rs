use anyhow::{Context, Result};
use arcade_server::store::{MemoryStore, RankingStore, RedisStore};
use arcade_server::{Api, Clock, Engine, ServerConfig, SignatureMode, SystemClock};
use arcade_types::AggregationPolicy;
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};
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
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "arcade-server".to_string());
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
        let tracer = tracer_provider.tracer("arcade-server");
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
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Redis URL for the ranking store (falls back to REDIS_URL; in-memory when neither is set).
    #[arg(long)]
    redis_url: Option<String>,

    /// Prefix applied to every Redis key.
    #[arg(long)]
    redis_prefix: Option<String>,

    /// Timeout for a single store call in milliseconds.
    #[arg(long)]
    store_timeout_ms: Option<u64>,

    /// Score aggregation policy: replace-if-higher or cumulative.
    #[arg(long)]
    policy: Option<AggregationPolicy>,

    /// Submission signature requirement: none or wallet.
    #[arg(long)]
    signature_mode: Option<SignatureMode>,

    /// Highest score a single submission may carry.
    #[arg(long)]
    max_score: Option<u64>,

    /// Lifetime of a session token in seconds.
    #[arg(long)]
    session_ttl_secs: Option<u64>,

    /// Lifetime of a free-play quota record in seconds (at least one day).
    #[arg(long)]
    quota_ttl_secs: Option<u64>,

    /// Lifetime of a daily board after its last write, in seconds.
    #[arg(long)]
    daily_board_ttl_secs: Option<u64>,

    /// Price hint returned when the daily free play is used up.
    #[arg(long)]
    session_cost: Option<String>,

    /// Leaderboard page size when the request names none.
    #[arg(long)]
    page_limit_default: Option<u64>,

    /// Largest leaderboard page a request may ask for.
    #[arg(long)]
    page_limit_max: Option<u64>,

    /// Avatar URL for identities without one; `{identity}` is substituted.
    #[arg(long)]
    avatar_template: Option<String>,

    /// HTTP rate limit per IP in requests per second (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    /// HTTP rate limit burst size (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Score endpoint rate limit per IP in requests per minute (0 disables).
    #[arg(long)]
    score_rate_limit_per_minute: Option<u64>,

    /// Score endpoint rate limit burst size (0 disables).
    #[arg(long)]
    score_rate_limit_burst: Option<u32>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    let redis_url = args
        .redis_url
        .clone()
        .or_else(|| std::env::var("REDIS_URL").ok())
        .filter(|url| !url.trim().is_empty());

    let config = ServerConfig {
        policy: args.policy.unwrap_or(defaults.policy),
        signature_mode: args.signature_mode.unwrap_or(defaults.signature_mode),
        max_score: args.max_score.unwrap_or(defaults.max_score),
        session_ttl_secs: args.session_ttl_secs.unwrap_or(defaults.session_ttl_secs),
        quota_ttl_secs: args.quota_ttl_secs.unwrap_or(defaults.quota_ttl_secs),
        daily_board_ttl_secs: args
            .daily_board_ttl_secs
            .unwrap_or(defaults.daily_board_ttl_secs),
        store_timeout_ms: args.store_timeout_ms.unwrap_or(defaults.store_timeout_ms),
        session_cost: args.session_cost.clone().unwrap_or(defaults.session_cost),
        page_limit_default: args
            .page_limit_default
            .unwrap_or(defaults.page_limit_default),
        page_limit_max: args.page_limit_max.unwrap_or(defaults.page_limit_max),
        anonymous_name: defaults.anonymous_name,
        avatar_template: args
            .avatar_template
            .clone()
            .unwrap_or(defaults.avatar_template),
        redis_url,
        redis_prefix: args.redis_prefix.clone().unwrap_or(defaults.redis_prefix),
        http_rate_limit_per_second: map_optional_limit(
            args.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second,
        ),
        http_rate_limit_burst: map_optional_limit(
            args.http_rate_limit_burst,
            defaults.http_rate_limit_burst,
        ),
        score_rate_limit_per_minute: map_optional_limit(
            args.score_rate_limit_per_minute,
            defaults.score_rate_limit_per_minute,
        ),
        score_rate_limit_burst: map_optional_limit(
            args.score_rate_limit_burst,
            defaults.score_rate_limit_burst,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
    };
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn build_store(config: &ServerConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn RankingStore>> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::new(url, config.redis_prefix.clone(), config.store_timeout())
                .context("invalid redis url")?;
            info!(prefix = %config.redis_prefix, "using redis ranking store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no redis url configured; scores live in process memory and vanish on restart");
            Ok(Arc::new(MemoryStore::new(clock)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    let config = build_config(&args)?;
    info!(
        policy = ?config.policy,
        signature_mode = ?config.signature_mode,
        max_score = config.max_score,
        "arcade server configured"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config, clock.clone())?;
    let engine = Arc::new(Engine::new(config, store, clock));
    if let Err(err) = engine.ready().await {
        warn!(?err, "ranking store not reachable at startup; will retry per request");
    }

    let api = Api::new(engine);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
