use arcade_types::{Identity, DATE_FORMAT};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use crate::store::{RankingStore, StoreResult};

/// Per-identity, per-day record of free play consumption.
pub struct QuotaLedger {
    store: Arc<dyn RankingStore>,
    ttl: Duration,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn RankingStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub(crate) fn key(identity: &Identity, date: NaiveDate) -> String {
        format!("quota:{}:{}", date.format(DATE_FORMAT), identity)
    }

    /// Consume the free play for `date`. Returns `false` when it was already used.
    ///
    /// A single set-if-absent, so concurrent callers can never both win.
    pub async fn try_consume_free_quota(
        &self,
        identity: &Identity,
        date: NaiveDate,
    ) -> StoreResult<bool> {
        self.store
            .set_if_absent(&Self::key(identity, date), "1", self.ttl)
            .await
    }

    /// Hand a consumed free play back. Only used when no session could be minted for it.
    pub async fn refund(&self, identity: &Identity, date: NaiveDate) -> StoreResult<()> {
        self.store.delete(&Self::key(identity, date)).await
    }
}
