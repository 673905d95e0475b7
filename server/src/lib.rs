use arcade_types::api::{
    LeaderboardPage, LeaderboardQuery, ScoreAccepted, ScoreSubmission, SessionRequest,
};
use arcade_types::{Board, BoardKind, Identity, DATE_FORMAT, MAX_PAGE_OFFSET};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

mod aggregator;
pub use aggregator::{normalize_metadata, Accepted, ScoreAggregator, Submission};

mod api;
pub use api::Api;

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

mod config;
pub use config::{ServerConfig, SignatureMode};

mod error;
pub use error::{AuthError, EngineError, ValidationError};

mod leaderboard;
pub use leaderboard::{DisplayDefaults, LeaderboardReader};

mod metrics;
pub use metrics::{EngineMetricsSnapshot, HttpMetricsSnapshot, LatencySnapshot};
use metrics::{EngineMetrics, HttpMetrics};

mod quota;
pub use quota::QuotaLedger;

mod session;
pub use session::{IssuedSession, SessionAuthority, SessionRecord};

mod signature;
pub use signature::SignatureVerifier;

pub mod store;
use store::{MemoryStore, RankingStore, StoreResult};

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub engine: EngineMetricsSnapshot,
    pub http: HttpMetricsSnapshot,
}

/// The assembled service: one store, one clock, one policy.
pub struct Engine {
    pub config: ServerConfig,
    store: Arc<dyn RankingStore>,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionAuthority>,
    aggregator: ScoreAggregator,
    reader: LeaderboardReader,
    engine_metrics: EngineMetrics,
    http_metrics: HttpMetrics,
}

impl Engine {
    pub fn new(config: ServerConfig, store: Arc<dyn RankingStore>, clock: Arc<dyn Clock>) -> Self {
        let ledger = QuotaLedger::new(store.clone(), config.quota_ttl());
        let sessions = Arc::new(SessionAuthority::new(
            store.clone(),
            ledger,
            clock.clone(),
            config.session_ttl(),
            config.session_cost.clone(),
        ));
        let aggregator = ScoreAggregator::new(
            store.clone(),
            sessions.clone(),
            SignatureVerifier::from(config.signature_mode),
            clock.clone(),
            config.policy,
            config.max_score,
            config.daily_board_ttl(),
        );
        let reader = LeaderboardReader::new(
            store.clone(),
            DisplayDefaults {
                anonymous_name: config.anonymous_name.clone(),
                avatar_template: config.avatar_template.clone(),
            },
            config.page_limit_default,
            config.page_limit_max,
        );
        Self {
            config,
            store,
            clock,
            sessions,
            aggregator,
            reader,
            engine_metrics: EngineMetrics::default(),
            http_metrics: HttpMetrics::default(),
        }
    }

    /// Process-local engine, for tests and single-instance development.
    pub fn in_memory(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::new(config, store, clock)
    }

    pub async fn request_session(
        &self,
        request: &SessionRequest,
    ) -> Result<IssuedSession, EngineError> {
        let identity = Identity::parse(&request.identity)?;
        let result = self
            .sessions
            .request_session(&identity, request.payment_proof.as_deref())
            .await;
        match &result {
            Ok(session) => self
                .engine_metrics
                .inc_session(session.kind == arcade_types::SessionKind::Paid),
            Err(EngineError::QuotaExceeded { .. }) => self.engine_metrics.inc_session_denied(),
            Err(err) => self.observe_error(err),
        }
        result
    }

    pub async fn submit_score(
        &self,
        submission: &ScoreSubmission,
    ) -> Result<ScoreAccepted, EngineError> {
        let result = self.submit_inner(submission).await;
        match &result {
            Ok(accepted) => {
                self.engine_metrics
                    .inc_score_accepted(accepted.new_high_score == Some(true));
                self.engine_metrics.add_degraded_writes(accepted.warnings.len());
            }
            Err(err) => {
                self.engine_metrics.inc_score_rejected(err);
                self.observe_error(err);
            }
        }
        result
    }

    async fn submit_inner(
        &self,
        submission: &ScoreSubmission,
    ) -> Result<ScoreAccepted, EngineError> {
        let identity = Identity::parse(&submission.identity)?;
        let accepted = self
            .aggregator
            .submit_score(&Submission {
                session_token: submission.session_token.clone(),
                identity,
                score: submission.score,
                signature: submission.signature.clone(),
                metadata: submission.metadata.clone(),
            })
            .await?;
        Ok(ScoreAccepted {
            accepted: true,
            policy: accepted.policy,
            final_score: accepted.final_score,
            new_high_score: accepted.new_high_score,
            new_total: accepted.new_total,
            warnings: accepted.warnings.iter().map(|w| w.to_string()).collect(),
        })
    }

    pub async fn leaderboard(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<LeaderboardPage, EngineError> {
        let board = self.resolve_board(query)?;
        let offset = query.offset.unwrap_or(0);
        if offset > MAX_PAGE_OFFSET {
            return Err(ValidationError::OffsetOutOfRange {
                offset,
                max: MAX_PAGE_OFFSET,
            }
            .into());
        }
        let viewer = query
            .viewer
            .as_deref()
            .filter(|viewer| !viewer.trim().is_empty())
            .map(Identity::parse)
            .transpose()?;
        let result = self
            .reader
            .get_page(&board, offset, query.limit, viewer.as_ref())
            .await;
        if let Err(err) = &result {
            self.observe_error(err);
        }
        result
    }

    /// Daily boards default to today's UTC date.
    fn resolve_board(&self, query: &LeaderboardQuery) -> Result<Board, ValidationError> {
        match query.board.unwrap_or_default() {
            BoardKind::AllTime => Ok(Board::AllTime),
            BoardKind::Daily => match query.date.as_deref().map(str::trim) {
                None | Some("") => Ok(Board::Daily(self.clock.today())),
                Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                    .map(Board::Daily)
                    .map_err(|_| ValidationError::InvalidDate {
                        value: raw.to_string(),
                    }),
            },
        }
    }

    /// Round-trip the store.
    pub async fn ready(&self) -> StoreResult<()> {
        self.store.ping().await
    }

    pub fn policy(&self) -> arcade_types::AggregationPolicy {
        self.aggregator.policy()
    }

    fn observe_error(&self, err: &EngineError) {
        if let EngineError::StoreUnavailable(store_err) = err {
            self.engine_metrics.inc_store_error();
            warn!(?store_err, "store unavailable");
        }
    }

    pub(crate) fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            engine: self.engine_metrics.snapshot(),
            http: self.http_metrics.snapshot(),
        }
    }
}
