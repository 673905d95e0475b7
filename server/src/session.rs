use arcade_types::{Identity, SessionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AuthError, EngineError};
use crate::quota::QuotaLedger;
use crate::store::{RankingStore, StoreError, StoreResult};

/// What the store keeps for every minted token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub identity: Identity,
    pub kind: SessionKind,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    #[serde(default)]
    pub consumed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedSession {
    pub token: String,
    pub kind: SessionKind,
    pub expires_at_ms: u64,
}

/// A token that has been validated and claimed for exactly one submission.
#[derive(Debug)]
pub struct ClaimedSession {
    pub token: String,
    pub record: SessionRecord,
}

pub struct SessionAuthority {
    store: Arc<dyn RankingStore>,
    ledger: QuotaLedger,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cost: String,
}

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

fn lock_key(token: &str) -> String {
    format!("session:{token}:lock")
}

impl SessionAuthority {
    pub fn new(
        store: Arc<dyn RankingStore>,
        ledger: QuotaLedger,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        cost: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            ttl,
            cost: cost.into(),
        }
    }

    /// Grant a play session.
    ///
    /// A non-blank `payment_proof` always yields a paid session. Without one the
    /// identity's free play for the current UTC day is consumed, or
    /// [`EngineError::QuotaExceeded`] is returned when it is already gone.
    pub async fn request_session(
        &self,
        identity: &Identity,
        payment_proof: Option<&str>,
    ) -> Result<IssuedSession, EngineError> {
        let paid = payment_proof.is_some_and(|proof| !proof.trim().is_empty());
        if paid {
            return Ok(self.mint(identity, SessionKind::Paid).await?);
        }

        let today = self.clock.today();
        if !self.ledger.try_consume_free_quota(identity, today).await? {
            debug!(%identity, %today, "free play already used");
            return Err(EngineError::QuotaExceeded {
                cost: self.cost.clone(),
            });
        }
        match self.mint(identity, SessionKind::Free).await {
            Ok(session) => Ok(session),
            Err(err) => {
                if let Err(refund_err) = self.ledger.refund(identity, today).await {
                    warn!(%identity, ?refund_err, "failed to refund free play");
                }
                Err(err.into())
            }
        }
    }

    async fn mint(&self, identity: &Identity, kind: SessionKind) -> StoreResult<IssuedSession> {
        let token = Uuid::new_v4().simple().to_string();
        let issued_at_ms = self.clock.now_ms();
        let expires_at_ms = issued_at_ms.saturating_add(self.ttl.as_millis() as u64);
        let record = SessionRecord {
            identity: identity.clone(),
            kind,
            issued_at_ms,
            expires_at_ms,
            consumed: false,
        };
        self.write_record(&token, &record, self.ttl).await?;
        debug!(%identity, ?kind, "session issued");
        Ok(IssuedSession {
            token,
            kind,
            expires_at_ms,
        })
    }

    async fn write_record(
        &self,
        token: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> StoreResult<()> {
        let key = session_key(token);
        let encoded = serde_json::to_string(record).map_err(|err| StoreError::Corrupt {
            key: key.clone(),
            message: err.to_string(),
        })?;
        self.store.put(&key, &encoded, ttl).await
    }

    async fn read_record(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let key = session_key(token);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StoreError::Corrupt {
                key,
                message: err.to_string(),
            })
    }

    /// Check that `token` is live, unused and was issued to `identity`.
    pub async fn validate(
        &self,
        token: &str,
        identity: &Identity,
    ) -> Result<SessionRecord, EngineError> {
        let record = self
            .read_record(token)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        if record.consumed {
            return Err(AuthError::InvalidSession.into());
        }
        if record.identity != *identity {
            return Err(AuthError::IdentityMismatch.into());
        }
        if self.clock.now_ms() >= record.expires_at_ms {
            return Err(AuthError::SessionExpired.into());
        }
        Ok(record)
    }

    /// Take the single submission slot of `token`.
    ///
    /// The claim lives as long as the session itself, so a token stays retired
    /// even when [`Self::mark_consumed`] never lands. Only [`Self::release`]
    /// reopens it.
    pub async fn claim(
        &self,
        token: &str,
        identity: &Identity,
    ) -> Result<ClaimedSession, EngineError> {
        let record = self.validate(token, identity).await?;
        let remaining = record
            .expires_at_ms
            .saturating_sub(self.clock.now_ms())
            .max(1_000);
        let claimed = self
            .store
            .set_if_absent(
                &lock_key(token),
                identity.as_str(),
                Duration::from_millis(remaining),
            )
            .await?;
        if !claimed {
            return Err(AuthError::InvalidSession.into());
        }
        // A concurrent submission may have consumed the token between validation and the claim.
        match self.validate(token, identity).await {
            Ok(record) => Ok(ClaimedSession {
                token: token.to_string(),
                record,
            }),
            Err(err) => {
                self.release(token).await;
                Err(err)
            }
        }
    }

    /// Permanently retire a claimed token.
    pub async fn mark_consumed(&self, claimed: &ClaimedSession) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let remaining = claimed.record.expires_at_ms.saturating_sub(now).max(1_000);
        let record = SessionRecord {
            consumed: true,
            ..claimed.record.clone()
        };
        self.write_record(&claimed.token, &record, Duration::from_millis(remaining))
            .await
    }

    /// Give a claim back so the token can be retried.
    pub async fn release(&self, token: &str) {
        if let Err(err) = self.store.delete(&lock_key(token)).await {
            warn!(?err, "failed to release session claim");
        }
    }
}
