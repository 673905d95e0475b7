use arcade_types::Metadata;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, RedisResult, Script};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{score_from_f64, RankingStore, Ranked, StoreError, StoreResult, Upsert};

/// Conditional write: only replace a missing or strictly lower score.
/// Returns `{applied, final_score}`.
const UPSERT_IF_HIGHER: &str = r#"
local current = redis.call('ZSCORE', KEYS[1], ARGV[2])
if current == false or tonumber(ARGV[1]) > tonumber(current) then
    redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
    return {1, ARGV[1]}
end
return {0, current}
"#;

pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    prefix: String,
    timeout: Duration,
    upsert_script: Script,
}

impl RedisStore {
    pub fn new(url: &str, prefix: String, timeout: Duration) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            prefix,
            timeout,
            upsert_script: Script::new(UPSERT_IF_HIGHER),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn board_key(&self, board: &str) -> String {
        format!("{}leaderboard:{}", self.prefix, board)
    }

    fn metadata_key(&self, identity: &str) -> String {
        format!("{}user:{}", self.prefix, identity)
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = match tokio::time::timeout(self.timeout, self.client.get_connection_manager())
            .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => {
                tracing::warn!("Redis store connection failed: {err}");
                return Err(StoreError::Backend {
                    op: "connect",
                    message: err.to_string(),
                });
            }
            Err(_) => return Err(StoreError::Timeout { op: "connect" }),
        };
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Run one command with the store timeout. Never retries.
    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> StoreResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match tokio::time::timeout(self.timeout, command(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(op, "Redis store command failed: {err}");
                if err.is_connection_dropped() || err.is_io_error() || err.is_connection_refusal()
                {
                    *self.connection.lock().await = None;
                }
                Err(StoreError::Backend {
                    op,
                    message: err.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Redis store command timed out");
                Err(StoreError::Timeout { op })
            }
        }
    }
}

fn parse_score(key: &str, raw: &str) -> StoreResult<u64> {
    let value: f64 = raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        message: format!("score {raw:?} is not numeric"),
    })?;
    score_from_f64(key, value)
}

/// Whole seconds, rounded up so a key never expires before its deadline.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_millis().div_ceil(1_000).max(1) as u64
}

#[async_trait]
impl RankingStore for RedisStore {
    async fn upsert_if_higher(
        &self,
        board: &str,
        identity: &str,
        score: u64,
    ) -> StoreResult<Upsert> {
        let key = self.board_key(board);
        let script = self.upsert_script.clone();
        let member = identity.to_string();
        let script_key = key.clone();
        let (applied, final_score): (i64, String) = self
            .run("upsert_if_higher", move |mut conn| async move {
                script
                    .key(script_key)
                    .arg(score)
                    .arg(member)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(Upsert {
            applied: applied == 1,
            final_score: parse_score(&key, &final_score)?,
        })
    }

    async fn increment_by(&self, board: &str, identity: &str, delta: u64) -> StoreResult<u64> {
        let key = self.board_key(board);
        let member = identity.to_string();
        let cmd_key = key.clone();
        let total: f64 = self
            .run("increment_by", move |mut conn| async move {
                redis::cmd("ZINCRBY")
                    .arg(cmd_key)
                    .arg(delta)
                    .arg(member)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        score_from_f64(&key, total)
    }

    async fn get_score(&self, board: &str, identity: &str) -> StoreResult<Option<u64>> {
        let key = self.board_key(board);
        let member = identity.to_string();
        let cmd_key = key.clone();
        let score: Option<f64> = self
            .run("get_score", move |mut conn| async move {
                redis::cmd("ZSCORE")
                    .arg(cmd_key)
                    .arg(member)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        score.map(|raw| score_from_f64(&key, raw)).transpose()
    }

    async fn range_by_rank(
        &self,
        board: &str,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Ranked>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.board_key(board);
        let cmd_key = key.clone();
        let stop = offset.saturating_add(limit - 1);
        let members: Vec<(String, f64)> = self
            .run("range_by_rank", move |mut conn| async move {
                redis::cmd("ZREVRANGE")
                    .arg(cmd_key)
                    .arg(offset)
                    .arg(stop)
                    .arg("WITHSCORES")
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        members
            .into_iter()
            .map(|(identity, raw)| {
                Ok(Ranked {
                    identity,
                    score: score_from_f64(&key, raw)?,
                })
            })
            .collect()
    }

    async fn rank_of(&self, board: &str, identity: &str) -> StoreResult<Option<u64>> {
        let key = self.board_key(board);
        let member = identity.to_string();
        self.run("rank_of", move |mut conn| async move {
            redis::cmd("ZREVRANK")
                .arg(key)
                .arg(member)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn expire_board(&self, board: &str, ttl: Duration) -> StoreResult<()> {
        let key = self.board_key(board);
        let _: i64 = self
            .run("expire_board", move |mut conn| async move {
                redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_secs(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(())
    }

    async fn set_metadata(
        &self,
        identity: &str,
        metadata: &Metadata,
        updated_at_ms: u64,
    ) -> StoreResult<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.metadata_key(identity));
        if let Some(name) = &metadata.name {
            cmd.arg("name").arg(name);
        }
        if let Some(avatar) = &metadata.avatar {
            cmd.arg("avatar").arg(avatar);
        }
        cmd.arg("updated_at").arg(updated_at_ms);
        let _: i64 = self
            .run("set_metadata", move |mut conn| async move {
                cmd.query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn get_metadata(&self, identity: &str) -> StoreResult<Option<Metadata>> {
        let key = self.metadata_key(identity);
        let mut fields: HashMap<String, String> = self
            .run("get_metadata", move |mut conn| async move {
                redis::cmd("HGETALL").arg(key).query_async(&mut conn).await
            })
            .await?;
        let metadata = Metadata {
            name: fields.remove("name"),
            avatar: fields.remove("avatar"),
        };
        Ok((!metadata.is_empty()).then_some(metadata))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let key = self.key(key);
        let value = value.to_string();
        let reply: Option<String> = self
            .run("set_if_absent", move |mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let key = self.key(key);
        let value = value.to_string();
        let _: () = self
            .run("put", move |mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl_secs(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = self.key(key);
        self.run("get", move |mut conn| async move {
            redis::cmd("GET").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = self.key(key);
        let _: i64 = self
            .run("delete", move |mut conn| async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let _: String = self
            .run("ping", move |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisStore {
        RedisStore::new(
            "redis://127.0.0.1:6379",
            "arcade:".to_string(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn keys_carry_prefix() {
        let store = store();
        assert_eq!(store.board_key("alltime"), "arcade:leaderboard:alltime");
        assert_eq!(
            store.board_key("daily:2026-10-19"),
            "arcade:leaderboard:daily:2026-10-19"
        );
        assert_eq!(store.metadata_key("0xabc"), "arcade:user:0xabc");
        assert_eq!(store.key("quota:2026-10-19:0xabc"), "arcade:quota:2026-10-19:0xabc");
    }

    #[test]
    fn parses_store_scores() {
        assert_eq!(parse_score("k", "80"), Ok(80));
        assert_eq!(parse_score("k", "50000"), Ok(50_000));
        assert!(parse_score("k", "abc").is_err());
        assert!(parse_score("k", "-3").is_err());
    }

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_millis(1_500)), 2);
        assert_eq!(ttl_secs(Duration::from_secs(86_400)), 86_400);
    }

    /// Runs against a live server only when `ARCADE_TEST_REDIS_URL` is set.
    #[tokio::test]
    async fn live_round_trip() {
        let Ok(url) = std::env::var("ARCADE_TEST_REDIS_URL") else {
            return;
        };
        let prefix = format!("arcade-test:{}:", uuid::Uuid::new_v4().simple());
        let store = RedisStore::new(&url, prefix, Duration::from_secs(2)).unwrap();
        store.ping().await.unwrap();

        let first = store.upsert_if_higher("alltime", "a", 50).await.unwrap();
        assert_eq!(first, Upsert { applied: true, final_score: 50 });
        let lower = store.upsert_if_higher("alltime", "a", 30).await.unwrap();
        assert_eq!(lower, Upsert { applied: false, final_score: 50 });
        store.upsert_if_higher("alltime", "b", 50).await.unwrap();
        assert_eq!(store.rank_of("alltime", "b").await.unwrap(), Some(0));
        assert_eq!(store.rank_of("alltime", "a").await.unwrap(), Some(1));

        assert_eq!(store.increment_by("sum", "a", 50).await.unwrap(), 50);
        assert_eq!(store.increment_by("sum", "a", 30).await.unwrap(), 80);

        let ttl = Duration::from_secs(30);
        assert!(store.set_if_absent("quota:x", "1", ttl).await.unwrap());
        assert!(!store.set_if_absent("quota:x", "1", ttl).await.unwrap());

        for board in ["alltime", "sum"] {
            store.expire_board(board, Duration::from_secs(1)).await.unwrap();
        }
        store.delete("quota:x").await.unwrap();
    }
}
