use arcade_types::Metadata;
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{RankingStore, Ranked, StoreResult, Upsert};
use crate::clock::{Clock, SystemClock};

type OrderKey = (Reverse<u64>, Reverse<String>);

/// Writes between full sweeps of expired keys and boards.
const SWEEP_INTERVAL: u64 = 256;

#[derive(Default)]
struct MemoryBoard {
    scores: HashMap<String, u64>,
    order: BTreeSet<OrderKey>,
    expires_at_ms: Option<u64>,
}

impl MemoryBoard {
    fn set(&mut self, identity: &str, score: u64) {
        if let Some(previous) = self.scores.insert(identity.to_string(), score) {
            self.order
                .remove(&(Reverse(previous), Reverse(identity.to_string())));
        }
        self.order.insert((Reverse(score), Reverse(identity.to_string())));
    }

    fn rank_of(&self, identity: &str) -> Option<u64> {
        let score = *self.scores.get(identity)?;
        let key = (Reverse(score), Reverse(identity.to_string()));
        Some(self.order.range(..key).count() as u64)
    }
}

struct Entry {
    value: String,
    expires_at_ms: u64,
}

#[derive(Default)]
struct Inner {
    boards: HashMap<String, MemoryBoard>,
    metadata: HashMap<String, (Metadata, u64)>,
    entries: HashMap<String, Entry>,
    writes: u64,
}

impl Inner {
    /// Count a write and drop everything expired once per [`SWEEP_INTERVAL`].
    fn note_write(&mut self, now_ms: u64) {
        self.writes += 1;
        if self.writes % SWEEP_INTERVAL != 0 {
            return;
        }
        self.entries.retain(|_, entry| entry.expires_at_ms > now_ms);
        self.boards
            .retain(|_, board| board.expires_at_ms.map_or(true, |at| at > now_ms));
    }

    fn purge_board(&mut self, board: &str, now_ms: u64) {
        let expired = self
            .boards
            .get(board)
            .and_then(|b| b.expires_at_ms)
            .is_some_and(|at| at <= now_ms);
        if expired {
            self.boards.remove(board);
        }
    }

    fn board(&mut self, board: &str, now_ms: u64) -> Option<&mut MemoryBoard> {
        self.purge_board(board, now_ms);
        self.boards.get_mut(board)
    }

    fn board_or_default(&mut self, board: &str, now_ms: u64) -> &mut MemoryBoard {
        self.purge_board(board, now_ms);
        self.boards.entry(board.to_string()).or_default()
    }

    fn entry(&mut self, key: &str, now_ms: u64) -> Option<&Entry> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at_ms <= now_ms)
        {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }
}

/// Process-local store for tests and single-instance development.
///
/// A single mutex serializes every call, which makes each trait method atomic
/// exactly like the corresponding Redis command. Expiry is evaluated lazily
/// against the injected clock.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expiry(&self, ttl: Duration) -> u64 {
        self.clock.now_ms().saturating_add(ttl.as_millis() as u64)
    }
}

#[async_trait]
impl RankingStore for MemoryStore {
    async fn upsert_if_higher(
        &self,
        board: &str,
        identity: &str,
        score: u64,
    ) -> StoreResult<Upsert> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        inner.note_write(now);
        let board = inner.board_or_default(board, now);
        match board.scores.get(identity).copied() {
            Some(current) if current >= score => Ok(Upsert {
                applied: false,
                final_score: current,
            }),
            _ => {
                board.set(identity, score);
                Ok(Upsert {
                    applied: true,
                    final_score: score,
                })
            }
        }
    }

    async fn increment_by(&self, board: &str, identity: &str, delta: u64) -> StoreResult<u64> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        inner.note_write(now);
        let board = inner.board_or_default(board, now);
        let total = board
            .scores
            .get(identity)
            .copied()
            .unwrap_or_default()
            .saturating_add(delta);
        board.set(identity, total);
        Ok(total)
    }

    async fn get_score(&self, board: &str, identity: &str) -> StoreResult<Option<u64>> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        Ok(inner
            .board(board, now)
            .and_then(|b| b.scores.get(identity).copied()))
    }

    async fn range_by_rank(
        &self,
        board: &str,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Ranked>> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        let Some(board) = inner.board(board, now) else {
            return Ok(Vec::new());
        };
        Ok(board
            .order
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(Reverse(score), Reverse(identity))| Ranked {
                identity: identity.clone(),
                score: *score,
            })
            .collect())
    }

    async fn rank_of(&self, board: &str, identity: &str) -> StoreResult<Option<u64>> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        Ok(inner.board(board, now).and_then(|b| b.rank_of(identity)))
    }

    async fn expire_board(&self, board: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let expires_at = self.expiry(ttl);
        let mut inner = self.lock();
        if let Some(board) = inner.board(board, now) {
            board.expires_at_ms = Some(expires_at);
        }
        Ok(())
    }

    async fn set_metadata(
        &self,
        identity: &str,
        metadata: &Metadata,
        updated_at_ms: u64,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let (stored, updated_at) = inner
            .metadata
            .entry(identity.to_string())
            .or_insert_with(|| (Metadata::default(), 0));
        if let Some(name) = &metadata.name {
            stored.name = Some(name.clone());
        }
        if let Some(avatar) = &metadata.avatar {
            stored.avatar = Some(avatar.clone());
        }
        *updated_at = updated_at_ms;
        Ok(())
    }

    async fn get_metadata(&self, identity: &str) -> StoreResult<Option<Metadata>> {
        let inner = self.lock();
        Ok(inner
            .metadata
            .get(identity)
            .map(|(metadata, _)| metadata.clone())
            .filter(|metadata| !metadata.is_empty()))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now_ms();
        let expires_at_ms = self.expiry(ttl);
        let mut inner = self.lock();
        inner.note_write(now);
        if inner.entry(key, now).is_some() {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(true)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let expires_at_ms = self.expiry(ttl);
        let mut inner = self.lock();
        inner.note_write(now);
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        Ok(inner.entry(key, now).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock().entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
