use arcade_types::Metadata;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{MemoryStore, RankingStore, Ranked, StoreError, StoreResult, Upsert};
use crate::clock::ManualClock;

/// Wraps a [`MemoryStore`] and fails selected operations on demand.
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    pub fail_alltime: AtomicBool,
    pub fail_daily: AtomicBool,
    pub fail_metadata: AtomicBool,
    pub fail_metadata_reads: AtomicBool,
    pub fail_put: AtomicBool,
}

impl FlakyStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: MemoryStore::new(clock),
            fail_alltime: AtomicBool::new(false),
            fail_daily: AtomicBool::new(false),
            fail_metadata: AtomicBool::new(false),
            fail_metadata_reads: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
        }
    }

    fn check(&self, board: &str) -> StoreResult<()> {
        let flag = if board.starts_with("daily:") {
            &self.fail_daily
        } else {
            &self.fail_alltime
        };
        fail_if(flag, "zadd")
    }
}

fn fail_if(flag: &AtomicBool, op: &'static str) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Timeout { op });
    }
    Ok(())
}

#[async_trait]
impl RankingStore for FlakyStore {
    async fn upsert_if_higher(
        &self,
        board: &str,
        identity: &str,
        score: u64,
    ) -> StoreResult<Upsert> {
        self.check(board)?;
        self.inner.upsert_if_higher(board, identity, score).await
    }

    async fn increment_by(&self, board: &str, identity: &str, delta: u64) -> StoreResult<u64> {
        self.check(board)?;
        self.inner.increment_by(board, identity, delta).await
    }

    async fn get_score(&self, board: &str, identity: &str) -> StoreResult<Option<u64>> {
        self.inner.get_score(board, identity).await
    }

    async fn range_by_rank(
        &self,
        board: &str,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Ranked>> {
        self.inner.range_by_rank(board, offset, limit).await
    }

    async fn rank_of(&self, board: &str, identity: &str) -> StoreResult<Option<u64>> {
        self.inner.rank_of(board, identity).await
    }

    async fn expire_board(&self, board: &str, ttl: Duration) -> StoreResult<()> {
        self.inner.expire_board(board, ttl).await
    }

    async fn set_metadata(
        &self,
        identity: &str,
        metadata: &Metadata,
        updated_at_ms: u64,
    ) -> StoreResult<()> {
        fail_if(&self.fail_metadata, "hset")?;
        self.inner.set_metadata(identity, metadata, updated_at_ms).await
    }

    async fn get_metadata(&self, identity: &str) -> StoreResult<Option<Metadata>> {
        fail_if(&self.fail_metadata_reads, "hgetall")?;
        self.inner.get_metadata(identity).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        fail_if(&self.fail_put, "set")?;
        self.inner.put(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}
