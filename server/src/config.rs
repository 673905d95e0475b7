use arcade_types::{AggregationPolicy, MAX_SCORE};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_MAX_SCORE: u64 = MAX_SCORE;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_QUOTA_TTL_SECS: u64 = 48 * 60 * 60;
pub const MIN_QUOTA_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_DAILY_BOARD_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SESSION_COST: &str = "0.1 USDC";
pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const DEFAULT_MAX_PAGE_LIMIT: u64 = 100;
pub const DEFAULT_ANONYMOUS_NAME: &str = "Anonymous";
pub const DEFAULT_AVATAR_TEMPLATE: &str = "https://api.dicebear.com/9.x/avataaars/svg?seed={identity}";
pub const DEFAULT_REDIS_PREFIX: &str = "arcade:";
pub const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 50;
pub const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 200;
pub const DEFAULT_SCORE_RATE_LIMIT_PER_MINUTE: u64 = 30;
pub const DEFAULT_SCORE_RATE_LIMIT_BURST: u32 = 5;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Whether submissions must carry a wallet signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    #[default]
    None,
    Wallet,
}

impl std::str::FromStr for SignatureMode {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "wallet" | "wallet-signature" => Ok(Self::Wallet),
            _ => Err("valid values: none, wallet"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub policy: AggregationPolicy,
    pub signature_mode: SignatureMode,
    pub max_score: u64,
    pub session_ttl_secs: u64,
    pub quota_ttl_secs: u64,
    pub daily_board_ttl_secs: u64,
    pub store_timeout_ms: u64,
    pub session_cost: String,
    pub page_limit_default: u64,
    pub page_limit_max: u64,
    pub anonymous_name: String,
    pub avatar_template: String,
    #[serde(skip_serializing)]
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub score_rate_limit_per_minute: Option<u64>,
    pub score_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            policy: AggregationPolicy::default(),
            signature_mode: SignatureMode::default(),
            max_score: DEFAULT_MAX_SCORE,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            quota_ttl_secs: DEFAULT_QUOTA_TTL_SECS,
            daily_board_ttl_secs: DEFAULT_DAILY_BOARD_TTL_SECS,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            session_cost: DEFAULT_SESSION_COST.to_string(),
            page_limit_default: DEFAULT_PAGE_LIMIT,
            page_limit_max: DEFAULT_MAX_PAGE_LIMIT,
            anonymous_name: DEFAULT_ANONYMOUS_NAME.to_string(),
            avatar_template: DEFAULT_AVATAR_TEMPLATE.to_string(),
            redis_url: None,
            redis_prefix: DEFAULT_REDIS_PREFIX.to_string(),
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            score_rate_limit_per_minute: Some(DEFAULT_SCORE_RATE_LIMIT_PER_MINUTE),
            score_rate_limit_burst: Some(DEFAULT_SCORE_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn quota_ttl(&self) -> Duration {
        Duration::from_secs(self.quota_ttl_secs)
    }

    pub fn daily_board_ttl(&self) -> Duration {
        Duration::from_secs(self.daily_board_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_score == 0 {
            return Err("max_score must be > 0".to_string());
        }
        for (field, value) in [
            ("session_ttl_secs", self.session_ttl_secs),
            ("daily_board_ttl_secs", self.daily_board_ttl_secs),
            ("store_timeout_ms", self.store_timeout_ms),
            ("page_limit_max", self.page_limit_max),
            ("page_limit_default", self.page_limit_default),
        ] {
            if value == 0 {
                return Err(format!("{field} must be > 0"));
            }
        }
        if self.quota_ttl_secs < MIN_QUOTA_TTL_SECS {
            return Err(format!(
                "quota_ttl_secs must be >= {MIN_QUOTA_TTL_SECS} (got {})",
                self.quota_ttl_secs
            ));
        }
        if self.page_limit_default > self.page_limit_max {
            return Err(format!(
                "page_limit_default ({}) must not exceed page_limit_max ({})",
                self.page_limit_default, self.page_limit_max
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_short_quota_ttl() {
        let config = ServerConfig {
            quota_ttl_secs: 3_600,
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("quota_ttl_secs"), "unexpected error: {err}");
    }

    #[test]
    fn rejects_inverted_page_limits() {
        let config = ServerConfig {
            page_limit_default: 200,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn signature_mode_parses() {
        assert_eq!("WALLET".parse::<SignatureMode>(), Ok(SignatureMode::Wallet));
        assert_eq!("none".parse::<SignatureMode>(), Ok(SignatureMode::None));
        assert!("jwt".parse::<SignatureMode>().is_err());
    }
}
