use arcade_types::api::{WARN_DAILY_BOARD, WARN_METADATA};
use arcade_types::{AggregationPolicy, Board, Identity, Metadata, MAX_AVATAR_LENGTH, MAX_NAME_LENGTH};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{EngineError, ValidationError};
use crate::session::SessionAuthority;
use crate::signature::SignatureVerifier;
use crate::store::{RankingStore, StoreResult};

/// A score submission after transport decoding.
#[derive(Clone, Debug)]
pub struct Submission {
    pub session_token: String,
    pub identity: Identity,
    pub score: i64,
    pub signature: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Effect of one accepted submission on the all-time board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accepted {
    pub policy: AggregationPolicy,
    /// Stored all-time value after the write.
    pub final_score: u64,
    /// Replace-if-higher only.
    pub new_high_score: Option<bool>,
    /// Cumulative only.
    pub new_total: Option<u64>,
    /// Secondary writes that failed without undoing the primary one.
    pub warnings: Vec<&'static str>,
}

pub struct ScoreAggregator {
    store: Arc<dyn RankingStore>,
    sessions: Arc<SessionAuthority>,
    verifier: SignatureVerifier,
    clock: Arc<dyn Clock>,
    policy: AggregationPolicy,
    max_score: u64,
    daily_board_ttl: Duration,
}

impl ScoreAggregator {
    pub fn new(
        store: Arc<dyn RankingStore>,
        sessions: Arc<SessionAuthority>,
        verifier: SignatureVerifier,
        clock: Arc<dyn Clock>,
        policy: AggregationPolicy,
        max_score: u64,
        daily_board_ttl: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            verifier,
            clock,
            policy,
            max_score,
            daily_board_ttl,
        }
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    /// Validate, authenticate and apply one score.
    ///
    /// Checks run in order (range, session, signature) and nothing is written
    /// until all pass. The session is consumed only once the all-time board
    /// holds the new value; a failed all-time write leaves it usable.
    pub async fn submit_score(&self, submission: &Submission) -> Result<Accepted, EngineError> {
        let score = self.check_range(submission.score)?;
        let metadata = submission
            .metadata
            .as_ref()
            .map(normalize_metadata)
            .transpose()?
            .filter(|metadata| !metadata.is_empty());
        let token = submission.session_token.trim();
        if token.is_empty() {
            return Err(ValidationError::EmptySessionToken.into());
        }
        let identity = &submission.identity;

        self.sessions.validate(token, identity).await?;
        self.verifier
            .verify(identity, token, score, submission.signature.as_deref())?;

        let claimed = self.sessions.claim(token, identity).await?;
        let primary = match self.apply(&Board::AllTime, identity, score).await {
            Ok(primary) => primary,
            Err(err) => {
                self.sessions.release(token).await;
                return Err(err.into());
            }
        };
        if let Err(err) = self.sessions.mark_consumed(&claimed).await {
            // The claim keeps the token retired until the session expires.
            error!(%identity, ?err, "failed to mark session consumed");
        }

        let mut warnings = Vec::new();
        let daily = Board::Daily(self.clock.today());
        if let Err(err) = self.apply_daily(&daily, identity, score).await {
            warn!(%identity, board = %daily, ?err, "daily board write failed");
            warnings.push(WARN_DAILY_BOARD);
        }
        if let Some(metadata) = metadata {
            if let Err(err) = self
                .store
                .set_metadata(identity.as_str(), &metadata, self.clock.now_ms())
                .await
            {
                warn!(%identity, ?err, "metadata write failed");
                warnings.push(WARN_METADATA);
            }
        }

        info!(
            %identity,
            score,
            final_score = primary.final_score,
            policy = ?self.policy,
            "score accepted"
        );
        Ok(Accepted {
            policy: self.policy,
            warnings,
            ..primary
        })
    }

    fn check_range(&self, score: i64) -> Result<u64, ValidationError> {
        u64::try_from(score)
            .ok()
            .filter(|score| *score <= self.max_score)
            .ok_or(ValidationError::ScoreOutOfRange {
                score,
                max: self.max_score,
            })
    }

    async fn apply(&self, board: &Board, identity: &Identity, score: u64) -> StoreResult<Accepted> {
        let board = board.name();
        let accepted = match self.policy {
            AggregationPolicy::ReplaceIfHigher => {
                let upsert = self
                    .store
                    .upsert_if_higher(&board, identity.as_str(), score)
                    .await?;
                Accepted {
                    policy: self.policy,
                    final_score: upsert.final_score,
                    new_high_score: Some(upsert.applied),
                    new_total: None,
                    warnings: Vec::new(),
                }
            }
            AggregationPolicy::Cumulative => {
                let total = self
                    .store
                    .increment_by(&board, identity.as_str(), score)
                    .await?;
                Accepted {
                    policy: self.policy,
                    final_score: total,
                    new_high_score: None,
                    new_total: Some(total),
                    warnings: Vec::new(),
                }
            }
        };
        Ok(accepted)
    }

    async fn apply_daily(&self, board: &Board, identity: &Identity, score: u64) -> StoreResult<()> {
        self.apply(board, identity, score).await?;
        self.store
            .expire_board(&board.name(), self.daily_board_ttl)
            .await
    }
}

/// Trim display fields, drop blank ones and enforce length limits.
pub fn normalize_metadata(metadata: &Metadata) -> Result<Metadata, ValidationError> {
    fn clean(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    let name = clean(&metadata.name);
    if let Some(name) = &name {
        let len = name.chars().count();
        if len > MAX_NAME_LENGTH {
            return Err(ValidationError::NameTooLong {
                len,
                max: MAX_NAME_LENGTH,
            });
        }
    }
    let avatar = clean(&metadata.avatar);
    if let Some(avatar) = &avatar {
        let len = avatar.chars().count();
        if len > MAX_AVATAR_LENGTH {
            return Err(ValidationError::AvatarTooLong {
                len,
                max: MAX_AVATAR_LENGTH,
            });
        }
    }
    Ok(Metadata { name, avatar })
}
