//! JSON bodies exchanged over the HTTP API.
//!
//! Field names are camelCase on the wire to match the browser front end.

use crate::{AggregationPolicy, BoardKind, Metadata, SessionKind};
use serde::{Deserialize, Serialize};

/// Machine-readable reason returned when the free daily play is used up.
pub const DAILY_LIMIT_REASON: &str = "DAILY_LIMIT";

/// Warning attached to an accepted score when the daily board could not be updated.
pub const WARN_DAILY_BOARD: &str = "daily_board_write_failed";

/// Warning attached to an accepted score when metadata could not be stored.
pub const WARN_METADATA: &str = "metadata_write_failed";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_proof: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGranted {
    pub granted: bool,
    pub session_token: String,
    pub kind: SessionKind,
    pub expires_at_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDenied {
    pub granted: bool,
    pub reason: String,
    pub cost: String,
    pub requires_payment: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub session_token: String,
    pub identity: String,
    /// Signed so that negative values reach range validation instead of failing to decode.
    pub score: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAccepted {
    pub accepted: bool,
    pub policy: AggregationPolicy,
    pub final_score: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_high_score: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    #[serde(default, alias = "period", skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardKind>,
    /// `YYYY-MM-DD`, only meaningful for daily boards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position in the full ordering.
    pub rank: u64,
    pub identity: String,
    pub score: u64,
    pub name: String,
    pub avatar: String,
}

/// The viewer's own standing. `rank` is `None` when the viewer has no score yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerRank {
    pub rank: Option<u64>,
    pub identity: String,
    pub score: u64,
    pub name: String,
    pub avatar: String,
}

impl From<LeaderboardEntry> for ViewerRank {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            rank: Some(entry.rank),
            identity: entry.identity,
            score: entry.score,
            name: entry.name,
            avatar: entry.avatar,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub board: String,
    pub entries: Vec<LeaderboardEntry>,
    pub viewer_rank: Option<ViewerRank>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
