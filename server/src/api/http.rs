use arcade_types::api::{
    ErrorResponse, LeaderboardQuery, ScoreSubmission, SessionDenied, SessionGranted,
    SessionRequest, DAILY_LIMIT_REASON,
};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State as AxumState},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{EngineError, ValidationError};
use crate::Engine;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Authentication(_) => StatusCode::UNAUTHORIZED,
            EngineError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            EngineError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Backend details stay in the logs.
        let error = match &self {
            EngineError::StoreUnavailable(_) => "store unavailable".to_string(),
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error,
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn malformed(message: String) -> Response {
    EngineError::from(ValidationError::Malformed(message)).into_response()
}

/// Liveness only; never touches the store.
pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn readyz(AxumState(engine): AxumState<Arc<Engine>>) -> Response {
    match engine.ready().await {
        Ok(()) => (StatusCode::OK, Json(ReadyResponse { ready: true, reason: None })).into_response(),
        Err(err) => {
            tracing::warn!(?err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    reason: Some("store_unavailable"),
                }),
            )
                .into_response()
        }
    }
}

pub(super) async fn session(
    AxumState(engine): AxumState<Arc<Engine>>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let response = match payload {
        Err(rejection) => malformed(rejection.body_text()),
        Ok(Json(request)) => match engine.request_session(&request).await {
            Ok(session) => Json(SessionGranted {
                granted: true,
                session_token: session.token,
                kind: session.kind,
                expires_at_ms: session.expires_at_ms,
            })
            .into_response(),
            Err(EngineError::QuotaExceeded { cost }) => (
                StatusCode::FORBIDDEN,
                Json(SessionDenied {
                    granted: false,
                    reason: DAILY_LIMIT_REASON.to_string(),
                    cost,
                    requires_payment: true,
                }),
            )
                .into_response(),
            Err(err) => err.into_response(),
        },
    };
    engine.http_metrics().record_session(start.elapsed());
    response
}

pub(super) async fn score(
    AxumState(engine): AxumState<Arc<Engine>>,
    payload: Result<Json<ScoreSubmission>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let response = match payload {
        Err(rejection) => malformed(rejection.body_text()),
        Ok(Json(submission)) => match engine.submit_score(&submission).await {
            Ok(accepted) => Json(accepted).into_response(),
            Err(err) => err.into_response(),
        },
    };
    engine.http_metrics().record_score(start.elapsed());
    response
}

pub(super) async fn leaderboard(
    AxumState(engine): AxumState<Arc<Engine>>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> Response {
    let start = Instant::now();
    let response = match query {
        Err(rejection) => malformed(rejection.body_text()),
        Ok(Query(query)) => match engine.leaderboard(&query).await {
            Ok(page) => Json(page).into_response(),
            Err(err) => err.into_response(),
        },
    };
    engine.http_metrics().record_leaderboard(start.elapsed());
    response
}

pub(super) async fn metrics(
    headers: HeaderMap,
    AxumState(engine): AxumState<Arc<Engine>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(engine.metrics_snapshot()).into_response()
}

fn metrics_auth_error(headers: &HeaderMap) -> Option<StatusCode> {
    let token = std::env::var("METRICS_AUTH_TOKEN").unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    let header_token = headers
        .get("x-metrics-token")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if bearer.as_deref() == Some(token.as_str()) || header_token.as_deref() == Some(token.as_str()) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use crate::api::Api;
    use crate::{Engine, ManualClock, ServerConfig};
    use arcade_types::api::{LeaderboardPage, ScoreAccepted, SessionDenied, SessionGranted};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const NOON_MS: u64 = 1_792_411_200_000;

    fn router() -> Router {
        let config = ServerConfig {
            http_rate_limit_per_second: None,
            score_rate_limit_per_minute: None,
            ..ServerConfig::default()
        };
        let clock = Arc::new(ManualClock::new(NOON_MS));
        Api::new(Arc::new(Engine::in_memory(config, clock))).router()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(router, request).await
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, request).await
    }

    fn decode<T: DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).unwrap()
    }

    async fn granted(router: &Router, identity: &str) -> SessionGranted {
        let (status, body) = post_json(
            router,
            "/session",
            json!({ "identity": identity, "paymentProof": "0xpaid" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        decode(&body)
    }

    #[tokio::test]
    async fn session_then_denial() {
        let router = router();
        let (status, body) = post_json(&router, "/session", json!({ "identity": "0xabc" })).await;
        assert_eq!(status, StatusCode::OK);
        let session: SessionGranted = decode(&body);
        assert!(session.granted);
        assert!(!session.session_token.is_empty());

        let (status, body) = post_json(&router, "/session", json!({ "identity": "0xabc" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let denied: SessionDenied = decode(&body);
        assert!(!denied.granted);
        assert_eq!(denied.reason, "DAILY_LIMIT");
        assert_eq!(denied.cost, "0.1 USDC");
        assert!(denied.requires_payment);
    }

    #[tokio::test]
    async fn bad_identity_and_bad_json_are_400() {
        let router = router();
        let (status, body) = post_json(&router, "/session", json!({ "identity": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: Value = decode(&body);
        assert_eq!(error["code"], "INVALID_IDENTITY");

        let request = Request::builder()
            .method("POST")
            .uri("/score")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: Value = decode(&body);
        assert_eq!(error["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn score_lifecycle() {
        let router = router();
        let session = granted(&router, "0xabc").await;
        let submission = json!({
            "sessionToken": session.session_token,
            "identity": "0xabc",
            "score": 420,
            "metadata": { "name": "Ada" }
        });

        let (status, body) = post_json(&router, "/score", submission.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let accepted: ScoreAccepted = decode(&body);
        assert!(accepted.accepted);
        assert_eq!(accepted.final_score, 420);
        assert_eq!(accepted.new_high_score, Some(true));
        assert!(accepted.warnings.is_empty());

        // Replay of the same token.
        let (status, body) = post_json(&router, "/score", submission).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let error: Value = decode(&body);
        assert_eq!(error["code"], "INVALID_SESSION");

        let (status, body) = get(&router, "/leaderboard?board=alltime&viewer=0xABC").await;
        assert_eq!(status, StatusCode::OK);
        let page: LeaderboardPage = decode(&body);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].rank, 1);
        assert_eq!(page.entries[0].name, "Ada");
        assert_eq!(page.viewer_rank, Some(page.entries[0].clone().into()));
    }

    #[tokio::test]
    async fn out_of_range_score_is_400() {
        let router = router();
        let session = granted(&router, "0xabc").await;
        let (status, body) = post_json(
            &router,
            "/score",
            json!({
                "sessionToken": session.session_token,
                "identity": "0xabc",
                "score": 50_001
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: Value = decode(&body);
        assert_eq!(error["code"], "SCORE_OUT_OF_RANGE");
    }

    #[tokio::test]
    async fn unknown_token_is_401() {
        let router = router();
        let (status, _) = post_json(
            &router,
            "/score",
            json!({ "sessionToken": "missing", "identity": "0xabc", "score": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn leaderboard_period_alias_and_unranked_viewer() {
        let router = router();
        let (status, body) = get(&router, "/leaderboard?period=daily&viewer=ghost").await;
        assert_eq!(status, StatusCode::OK);
        let page: Value = decode(&body);
        assert_eq!(page["board"], "daily:2026-10-19");
        assert_eq!(page["entries"], json!([]));
        assert_eq!(page["viewerRank"]["rank"], Value::Null);
        assert_eq!(page["viewerRank"]["score"], 0);

        let (status, _) = get(&router, "/leaderboard?board=weekly").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn probes_and_metrics() {
        let router = router();
        let (status, body) = get(&router, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decode::<Value>(&body), json!({ "ok": true }));

        let (status, body) = get(&router, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decode::<Value>(&body)["ready"], true);

        post_json(&router, "/session", json!({ "identity": "0xabc" })).await;
        let (status, body) = get(&router, "/metrics").await;
        if status == StatusCode::OK {
            let metrics: Value = decode(&body);
            assert_eq!(metrics["engine"]["sessions_free"], 1);
            assert_eq!(metrics["http"]["session"]["count"], 1);
        } else {
            // METRICS_AUTH_TOKEN is set in this environment.
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let router = router();
        let request = Request::builder()
            .uri("/healthz")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }
}
