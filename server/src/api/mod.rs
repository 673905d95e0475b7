use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Engine;

mod http;

pub struct Api {
    engine: Arc<Engine>,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

/// Per-IP limiter allowing one request every `period` with `burst` headroom.
fn governor_config(period: Duration, burst: u32, label: &str) -> Option<Arc<IpGovernorConfig>> {
    GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .or_else(|| {
            tracing::warn!(label, "invalid rate-limit config; falling back to defaults");
            default_governor_config()
        })
        .map(Arc::new)
}

impl Api {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn router(&self) -> Router {
        let config = &self.engine.config;

        let allowed_origins = parse_allowed_origins("ALLOWED_HTTP_ORIGINS");
        let cors = if allowed_origins.contains("*") {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            let origins = allowed_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                        None
                    }
                })
                .collect::<Vec<_>>();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([header::HeaderName::from_static("x-request-id")]);

        // Environment variables override config
        let http_rate_per_sec =
            parse_env_u64("RATE_LIMIT_HTTP_PER_SEC").or(config.http_rate_limit_per_second);
        let http_rate_burst =
            parse_env_u32("RATE_LIMIT_HTTP_BURST").or(config.http_rate_limit_burst);
        let score_rate_per_min =
            parse_env_u64("RATE_LIMIT_SCORE_PER_MIN").or(config.score_rate_limit_per_minute);
        let score_rate_burst =
            parse_env_u32("RATE_LIMIT_SCORE_BURST").or(config.score_rate_limit_burst);

        let governor_conf = match (http_rate_per_sec, http_rate_burst) {
            (Some(rate_per_second), Some(burst_size)) if rate_per_second > 0 && burst_size > 0 => {
                let period = Duration::from_nanos((1_000_000_000u64 / rate_per_second).max(1));
                governor_config(period, burst_size, "http")
            }
            _ => None,
        };

        let score_governor_conf = match (score_rate_per_min, score_rate_burst) {
            (Some(rate_per_minute), Some(burst_size)) if rate_per_minute > 0 && burst_size > 0 => {
                let period = Duration::from_nanos((60_000_000_000u64 / rate_per_minute).max(1));
                tracing::info!(
                    rate_per_minute,
                    burst_size,
                    period_ms = period.as_millis(),
                    "Score endpoint rate limit configured"
                );
                governor_config(period, burst_size, "score")
            }
            _ => None,
        };

        // Score submissions get their own, stricter limiter
        let score_route = match score_governor_conf {
            Some(config) => Router::new()
                .route("/score", post(http::score))
                .layer(GovernorLayer { config }),
            None => Router::new().route("/score", post(http::score)),
        };

        let router = Router::new()
            .route("/session", post(http::session))
            .route("/leaderboard", get(http::leaderboard))
            .route("/metrics", get(http::metrics));

        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };

        // Probes stay outside every rate limiter
        let router = router
            .merge(score_route)
            .route("/healthz", get(http::healthz))
            .route("/readyz", get(http::readyz));

        let router = router.layer(cors);
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn(request_id_middleware));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.engine.clone())
    }
}

fn parse_allowed_origins(var: &str) -> HashSet<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
