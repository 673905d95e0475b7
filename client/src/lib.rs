pub mod client;

pub use client::{Client, SessionOutcome, SubmitScore};
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("signing failed: {0}")]
    Signing(#[from] ethers::signers::WalletError),
    #[error("score {0} does not fit the wire format")]
    InvalidScore(u64),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

impl Error {
    /// Machine code from a JSON error body, when the server sent one.
    pub fn code(&self) -> Option<String> {
        match self {
            Error::FailedWithBody { body, .. } => {
                serde_json::from_str::<arcade_types::api::ErrorResponse>(body)
                    .ok()
                    .map(|response| response.code)
            }
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
