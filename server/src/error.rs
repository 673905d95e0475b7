use arcade_types::IdentityError;
use thiserror::Error;

use crate::store::StoreError;

/// Bad or missing input. Always the caller's fault, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid identity: {0}")]
    Identity(#[from] IdentityError),
    #[error("score {score} outside [0, {max}]")]
    ScoreOutOfRange { score: i64, max: u64 },
    #[error("name too long (len={len}, max={max})")]
    NameTooLong { len: usize, max: usize },
    #[error("avatar too long (len={len}, max={max})")]
    AvatarTooLong { len: usize, max: usize },
    #[error("invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("offset {offset} exceeds {max}")]
    OffsetOutOfRange { offset: u64, max: u64 },
    #[error("session token is empty")]
    EmptySessionToken,
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Identity(_) => "INVALID_IDENTITY",
            Self::ScoreOutOfRange { .. } => "SCORE_OUT_OF_RANGE",
            Self::NameTooLong { .. } | Self::AvatarTooLong { .. } => "INVALID_METADATA",
            Self::InvalidDate { .. } => "INVALID_DATE",
            Self::OffsetOutOfRange { .. } => "INVALID_PAGINATION",
            Self::EmptySessionToken => "INVALID_SESSION",
            Self::Malformed(_) => "MALFORMED_REQUEST",
        }
    }
}

/// The submission could not be tied to a live session of the claimed identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown and already-used tokens are deliberately indistinguishable.
    #[error("session token is unknown or already consumed")]
    InvalidSession,
    #[error("session token was issued to another identity")]
    IdentityMismatch,
    #[error("session token expired")]
    SessionExpired,
    #[error("signature required")]
    MissingSignature,
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("identity is not a wallet address")]
    NotAnAddress,
    #[error("signature does not match identity")]
    SignatureMismatch,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSession => "INVALID_SESSION",
            Self::IdentityMismatch => "SESSION_IDENTITY_MISMATCH",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::MissingSignature
            | Self::MalformedSignature(_)
            | Self::NotAnAddress
            | Self::SignatureMismatch => "INVALID_SIGNATURE",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authentication(#[from] AuthError),
    /// A business outcome rather than a fault: the caller may pay and retry.
    #[error("daily free play already used")]
    QuotaExceeded { cost: String },
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::Authentication(err) => err.code(),
            Self::QuotaExceeded { .. } => arcade_types::api::DAILY_LIMIT_REASON,
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<IdentityError> for EngineError {
    fn from(err: IdentityError) -> Self {
        Self::Validation(err.into())
    }
}
