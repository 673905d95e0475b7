//! Ranking store adapter.
//!
//! One trait over a score-ordered collection per board plus a small expiring
//! key/value space. Every score mutation is a single atomic store command so
//! concurrent writers for the same identity can never lose an update.
//!
//! ## Ordering
//!
//! Boards rank by score descending. Equal scores rank by identity in descending
//! byte order, which is what a reverse range over a Redis sorted set yields.
//! [`MemoryStore`] reproduces the same order so both backends agree on every rank.
//!
//! ## Redis key layout
//!
//! ```text
//! {prefix}leaderboard:alltime            → sorted set (identity → score)
//! {prefix}leaderboard:daily:YYYY-MM-DD   → sorted set, expires
//! {prefix}user:{identity}                → hash (name, avatar, updated_at)
//! {prefix}quota:YYYY-MM-DD:{identity}    → "1", expires
//! {prefix}session:{token}                → session record JSON, expires
//! {prefix}session:{token}:lock           → submission claim, expires
//! ```

use arcade_types::Metadata;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
pub(crate) mod flaky;
mod memory;
mod redis;

pub use self::redis::RedisStore;
pub use memory::MemoryStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store {op} timed out")]
    Timeout { op: &'static str },
    #[error("store {op} failed: {message}")]
    Backend { op: &'static str, message: String },
    #[error("corrupt value at {key}: {message}")]
    Corrupt { key: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a conditional high-score write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upsert {
    pub applied: bool,
    pub final_score: u64,
}

/// One member of a board as returned by a range query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ranked {
    pub identity: String,
    pub score: u64,
}

#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Store `score` unless the member already holds a score >= `score`.
    async fn upsert_if_higher(&self, board: &str, identity: &str, score: u64)
        -> StoreResult<Upsert>;

    /// Add `delta` to the member's score (absent counts as 0) and return the total.
    async fn increment_by(&self, board: &str, identity: &str, delta: u64) -> StoreResult<u64>;

    async fn get_score(&self, board: &str, identity: &str) -> StoreResult<Option<u64>>;

    /// Members at 0-based ranks `offset..offset + limit`, best first.
    async fn range_by_rank(&self, board: &str, offset: u64, limit: u64)
        -> StoreResult<Vec<Ranked>>;

    async fn top_n(&self, board: &str, n: u64) -> StoreResult<Vec<Ranked>> {
        self.range_by_rank(board, 0, n).await
    }

    /// 0-based descending rank of the member.
    async fn rank_of(&self, board: &str, identity: &str) -> StoreResult<Option<u64>>;

    async fn expire_board(&self, board: &str, ttl: Duration) -> StoreResult<()>;

    /// Overwrite the provided fields; fields left `None` keep their stored value.
    async fn set_metadata(
        &self,
        identity: &str,
        metadata: &Metadata,
        updated_at_ms: u64,
    ) -> StoreResult<()>;

    async fn get_metadata(&self, identity: &str) -> StoreResult<Option<Metadata>>;

    /// Atomic test-and-set: write `value` only when `key` does not exist.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Round-trip used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}

/// Convert a store-reported score into the integer domain used everywhere else.
pub(crate) fn score_from_f64(key: &str, raw: f64) -> StoreResult<u64> {
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            message: format!("score {raw} is not a non-negative integer"),
        });
    }
    Ok(raw as u64)
}
