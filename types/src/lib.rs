pub mod api;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

/// Upper bound (inclusive) of a single submitted score.
pub const MAX_SCORE: u64 = 50_000;

/// Longest identity accepted as a store key.
pub const MAX_IDENTITY_LENGTH: usize = 128;

/// Deepest leaderboard position a page may start at.
pub const MAX_PAGE_OFFSET: u64 = 1_000_000_000;

pub const MAX_NAME_LENGTH: usize = 64;
pub const MAX_AVATAR_LENGTH: usize = 2048;

/// Date format used in daily board names and quota keys.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity is empty")]
    Empty,
    #[error("identity too long (len={len}, max={max})")]
    TooLong { len: usize, max: usize },
    #[error("identity contains whitespace or control characters")]
    InvalidCharacter,
}

/// Normalized player identity (wallet address, social handle, ...).
///
/// Always lower-cased so that `0xABC` and `0xabc` resolve to the same store key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        let len = trimmed.chars().count();
        if len > MAX_IDENTITY_LENGTH {
            return Err(IdentityError::TooLong {
                len,
                max: MAX_IDENTITY_LENGTH,
            });
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(IdentityError::InvalidCharacter);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identity::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A named leaderboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Board {
    AllTime,
    Daily(NaiveDate),
}

impl Board {
    /// Store-agnostic collection name (`alltime`, `daily:2026-10-19`).
    pub fn name(&self) -> String {
        match self {
            Board::AllTime => "alltime".to_string(),
            Board::Daily(date) => format!("daily:{}", date.format(DATE_FORMAT)),
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Which leaderboard family a reader asks for; the date is resolved server side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    #[default]
    AllTime,
    Daily,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Free,
    Paid,
}

/// How a new score combines with the one already stored for an identity.
///
/// One policy is active per deployment and applies to every board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationPolicy {
    #[default]
    ReplaceIfHigher,
    Cumulative,
}

impl std::str::FromStr for AggregationPolicy {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "replace-if-higher" | "highest" | "max" => Ok(Self::ReplaceIfHigher),
            "cumulative" | "sum" => Ok(Self::Cumulative),
            _ => Err("valid values: replace-if-higher, cumulative"),
        }
    }
}

/// Display data attached to an identity, independent of any score.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar.is_none()
    }
}

/// Message a wallet signs to bind a score to the session that produced it.
pub fn score_message(session_token: &str, score: u64) -> String {
    format!("session:{session_token}:score:{score}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_trimmed_and_lowercased() {
        let identity = Identity::parse("  0xAbC ").unwrap();
        assert_eq!(identity.as_str(), "0xabc");
    }

    #[test]
    fn identity_rejects_bad_input() {
        assert_eq!(Identity::parse("   "), Err(IdentityError::Empty));
        assert_eq!(
            Identity::parse("a b"),
            Err(IdentityError::InvalidCharacter)
        );
        let long = "x".repeat(MAX_IDENTITY_LENGTH + 1);
        assert!(matches!(
            Identity::parse(&long),
            Err(IdentityError::TooLong { .. })
        ));
    }

    #[test]
    fn identity_deserializes_normalized() {
        let identity: Identity = serde_json::from_str("\"Player.Base.ETH\"").unwrap();
        assert_eq!(identity.as_str(), "player.base.eth");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }

    #[test]
    fn board_names() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(Board::AllTime.name(), "alltime");
        assert_eq!(Board::Daily(date).name(), "daily:2026-10-19");
    }

    #[test]
    fn policy_parses() {
        assert_eq!(
            "Replace-If-Higher".parse::<AggregationPolicy>(),
            Ok(AggregationPolicy::ReplaceIfHigher)
        );
        assert_eq!("sum".parse::<AggregationPolicy>(), Ok(AggregationPolicy::Cumulative));
        assert!("avg".parse::<AggregationPolicy>().is_err());
    }

    #[test]
    fn canonical_score_message() {
        assert_eq!(score_message("abc123", 420), "session:abc123:score:420");
    }
}
