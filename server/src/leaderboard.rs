use arcade_types::api::{LeaderboardEntry, LeaderboardPage, ViewerRank};
use arcade_types::{Board, Identity, Metadata};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

use crate::error::EngineError;
use crate::store::{RankingStore, StoreResult};

/// Presentation defaults for identities that never supplied metadata.
#[derive(Clone, Debug)]
pub struct DisplayDefaults {
    pub anonymous_name: String,
    /// `{identity}` is replaced with the identity.
    pub avatar_template: String,
}

impl DisplayDefaults {
    fn resolve(&self, identity: &str, metadata: Option<Metadata>) -> (String, String) {
        let metadata = metadata.unwrap_or_default();
        let name = metadata
            .name
            .unwrap_or_else(|| self.anonymous_name.clone());
        let avatar = metadata
            .avatar
            .unwrap_or_else(|| self.avatar_template.replace("{identity}", identity));
        (name, avatar)
    }
}

/// Read-only, paginated access to a board.
pub struct LeaderboardReader {
    store: Arc<dyn RankingStore>,
    defaults: DisplayDefaults,
    default_limit: u64,
    max_limit: u64,
}

impl LeaderboardReader {
    pub fn new(
        store: Arc<dyn RankingStore>,
        defaults: DisplayDefaults,
        default_limit: u64,
        max_limit: u64,
    ) -> Self {
        Self {
            store,
            defaults,
            default_limit,
            max_limit,
        }
    }

    /// Clamp a requested page size into `[1, max_limit]`.
    pub fn page_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }

    /// One page of `board` plus, optionally, the viewer's own standing.
    ///
    /// Ranks are 1-based. A viewer with no entry gets `rank: None` and score 0.
    /// Entries and viewer rank come from separate reads, so a concurrent write
    /// may make them briefly disagree.
    pub async fn get_page(
        &self,
        board: &Board,
        offset: u64,
        limit: Option<u64>,
        viewer: Option<&Identity>,
    ) -> Result<LeaderboardPage, EngineError> {
        let name = board.name();
        let limit = self.page_limit(limit);
        let ranked = self.store.range_by_rank(&name, offset, limit).await?;
        let entries = join_all(ranked.into_iter().enumerate().map(|(idx, member)| {
            let rank = offset + idx as u64 + 1;
            async move { self.entry(rank, member.identity, member.score).await }
        }))
        .await;

        let viewer_rank = match viewer {
            None => None,
            Some(viewer) => match entries.iter().find(|e| e.identity == viewer.as_str()) {
                Some(entry) => Some(ViewerRank::from(entry.clone())),
                None => Some(self.viewer_rank(&name, viewer).await?),
            },
        };

        Ok(LeaderboardPage {
            board: name,
            entries,
            viewer_rank,
        })
    }

    /// Display name and avatar. Metadata is best-effort: a failed read falls back to defaults.
    async fn display(&self, identity: &str) -> (String, String) {
        let metadata = match self.store.get_metadata(identity).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(identity, ?err, "metadata read failed; using defaults");
                None
            }
        };
        self.defaults.resolve(identity, metadata)
    }

    async fn entry(&self, rank: u64, identity: String, score: u64) -> LeaderboardEntry {
        let (name, avatar) = self.display(&identity).await;
        LeaderboardEntry {
            rank,
            identity,
            score,
            name,
            avatar,
        }
    }

    async fn viewer_rank(&self, board: &str, viewer: &Identity) -> StoreResult<ViewerRank> {
        let identity = viewer.as_str();
        let rank = self.store.rank_of(board, identity).await?;
        let score = match rank {
            Some(_) => self.store.get_score(board, identity).await?.unwrap_or_default(),
            None => 0,
        };
        let (name, avatar) = self.display(identity).await;
        Ok(ViewerRank {
            rank: rank.map(|rank| rank + 1),
            identity: identity.to_string(),
            score,
            name,
            avatar,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::flaky::FlakyStore;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering;

    fn reader() -> (Arc<MemoryStore>, LeaderboardReader) {
        let clock = Arc::new(ManualClock::new(1_792_411_200_000));
        let store = Arc::new(MemoryStore::new(clock));
        let reader = LeaderboardReader::new(
            store.clone(),
            DisplayDefaults {
                anonymous_name: "Anonymous".to_string(),
                avatar_template: "https://avatars.test/{identity}.svg".to_string(),
            },
            10,
            100,
        );
        (store, reader)
    }

    async fn seed(store: &MemoryStore, board: &str, members: &[(&str, u64)]) {
        for (identity, score) in members {
            store.upsert_if_higher(board, identity, *score).await.unwrap();
        }
    }

    #[tokio::test]
    async fn page_is_sorted_and_hydrated() {
        let (store, reader) = reader();
        seed(&store, "alltime", &[("a", 100), ("b", 300), ("c", 200)]).await;
        store
            .set_metadata(
                "b",
                &Metadata {
                    name: Some("Bea".to_string()),
                    avatar: None,
                },
                1,
            )
            .await
            .unwrap();

        let page = reader.get_page(&Board::AllTime, 0, None, None).await.unwrap();
        assert_eq!(page.board, "alltime");
        assert!(page.viewer_rank.is_none());
        let rows: Vec<_> = page
            .entries
            .iter()
            .map(|e| (e.rank, e.identity.as_str(), e.score))
            .collect();
        assert_eq!(rows, vec![(1, "b", 300), (2, "c", 200), (3, "a", 100)]);
        assert_eq!(page.entries[0].name, "Bea");
        assert_eq!(page.entries[0].avatar, "https://avatars.test/b.svg");
        assert_eq!(page.entries[1].name, "Anonymous");
    }

    #[tokio::test]
    async fn offset_pages_continue_ranks() {
        let (store, reader) = reader();
        let members: Vec<(String, u64)> = (0..25).map(|i| (format!("p{i:02}"), i)).collect();
        for (identity, score) in &members {
            store.upsert_if_higher("alltime", identity, *score).await.unwrap();
        }
        let page = reader
            .get_page(&Board::AllTime, 10, Some(10), None)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 10);
        assert_eq!(page.entries[0].rank, 11);
        assert_eq!(page.entries[0].score, 14);

        let tail = reader
            .get_page(&Board::AllTime, 20, Some(10), None)
            .await
            .unwrap();
        assert_eq!(tail.entries.len(), 5);
        assert_eq!(tail.entries.last().unwrap().rank, 25);
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let (_, reader) = reader();
        assert_eq!(reader.page_limit(None), 10);
        assert_eq!(reader.page_limit(Some(0)), 1);
        assert_eq!(reader.page_limit(Some(1_000)), 100);
    }

    #[tokio::test]
    async fn viewer_outside_page() {
        let (store, reader) = reader();
        seed(&store, "alltime", &[("a", 100), ("b", 300), ("c", 200)]).await;
        let viewer = Identity::parse("a").unwrap();
        let page = reader
            .get_page(&Board::AllTime, 0, Some(1), Some(&viewer))
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        let viewer_rank = page.viewer_rank.unwrap();
        assert_eq!(viewer_rank.rank, Some(3));
        assert_eq!(viewer_rank.score, 100);
    }

    #[tokio::test]
    async fn viewer_inside_page_matches_entry() {
        let (store, reader) = reader();
        seed(&store, "alltime", &[("a", 100), ("b", 300)]).await;
        let viewer = Identity::parse("b").unwrap();
        let page = reader
            .get_page(&Board::AllTime, 0, None, Some(&viewer))
            .await
            .unwrap();
        let viewer_rank = page.viewer_rank.unwrap();
        assert_eq!(viewer_rank.rank, Some(1));
        assert_eq!(viewer_rank.score, 300);
    }

    #[tokio::test]
    async fn unranked_viewer_gets_sentinel() {
        let (store, reader) = reader();
        seed(&store, "alltime", &[("a", 100)]).await;
        let viewer = Identity::parse("ghost").unwrap();
        let page = reader
            .get_page(&Board::AllTime, 0, None, Some(&viewer))
            .await
            .unwrap();
        let viewer_rank = page.viewer_rank.unwrap();
        assert_eq!(viewer_rank.rank, None);
        assert_eq!(viewer_rank.score, 0);
        assert_eq!(viewer_rank.name, "Anonymous");
    }

    #[tokio::test]
    async fn missing_board_is_empty() {
        let (_, reader) = reader();
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let page = reader
            .get_page(&Board::Daily(date), 0, None, None)
            .await
            .unwrap();
        assert_eq!(page.board, "daily:2020-01-01");
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn ties_share_deterministic_order() {
        let (store, reader) = reader();
        seed(&store, "alltime", &[("alice", 10), ("bob", 10), ("carol", 10)]).await;
        let first = reader.get_page(&Board::AllTime, 0, None, None).await.unwrap();
        let second = reader.get_page(&Board::AllTime, 0, None, None).await.unwrap();
        let order = |page: &LeaderboardPage| {
            page.entries
                .iter()
                .map(|e| e.identity.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), vec!["carol", "bob", "alice"]);
        assert_eq!(order(&first), order(&second));
    }

    #[tokio::test]
    async fn failed_metadata_reads_fall_back_to_defaults() {
        let clock = Arc::new(ManualClock::new(1_792_411_200_000));
        let store = Arc::new(FlakyStore::new(clock));
        let reader = LeaderboardReader::new(
            store.clone(),
            DisplayDefaults {
                anonymous_name: "Anonymous".to_string(),
                avatar_template: "https://avatars.test/{identity}.svg".to_string(),
            },
            10,
            100,
        );
        store.upsert_if_higher("alltime", "a", 100).await.unwrap();
        store.upsert_if_higher("alltime", "b", 50).await.unwrap();
        store
            .set_metadata(
                "a",
                &Metadata {
                    name: Some("Ada".to_string()),
                    avatar: None,
                },
                1,
            )
            .await
            .unwrap();
        store.fail_metadata_reads.store(true, Ordering::SeqCst);

        let viewer = Identity::parse("b").unwrap();
        let page = reader
            .get_page(&Board::AllTime, 0, Some(1), Some(&viewer))
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].name, "Anonymous");
        assert_eq!(page.entries[0].avatar, "https://avatars.test/a.svg");
        let viewer_rank = page.viewer_rank.unwrap();
        assert_eq!(viewer_rank.rank, Some(2));
        assert_eq!(viewer_rank.name, "Anonymous");
    }
}
