use crate::{Error, Result};
use arcade_types::api::{
    LeaderboardPage, LeaderboardQuery, ScoreAccepted, ScoreSubmission, SessionDenied,
    SessionGranted, SessionRequest,
};
use arcade_types::{score_message, Metadata};
use ethers::signers::{LocalWallet, Signer};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of asking for a play session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Granted(SessionGranted),
    /// The free play for today is gone; a payment proof is required.
    Denied(SessionDenied),
}

/// A score to submit under a previously granted session.
#[derive(Clone, Debug)]
pub struct SubmitScore {
    pub session_token: String,
    pub identity: String,
    pub score: u64,
    pub metadata: Option<Metadata>,
}

impl SubmitScore {
    fn to_wire(&self, signature: Option<String>) -> Result<ScoreSubmission> {
        let score = i64::try_from(self.score).map_err(|_| Error::InvalidScore(self.score))?;
        Ok(ScoreSubmission {
            session_token: self.session_token.clone(),
            identity: self.identity.clone(),
            score,
            signature,
            metadata: self.metadata.clone(),
        })
    }
}

#[derive(Clone)]
pub struct Client {
    pub(crate) base_url: Url,
    pub(crate) http_client: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => return Err(Error::InvalidScheme(other.to_string())),
        }
        let http_client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    pub async fn request_session(
        &self,
        identity: &str,
        payment_proof: Option<&str>,
    ) -> Result<SessionOutcome> {
        let request = SessionRequest {
            identity: identity.to_string(),
            payment_proof: payment_proof.map(str::to_string),
        };
        let response = self
            .http_client
            .post(self.endpoint("session")?)
            .json(&request)
            .send()
            .await?;
        match response.status() {
            reqwest::StatusCode::OK => Ok(SessionOutcome::Granted(response.json().await?)),
            reqwest::StatusCode::FORBIDDEN => {
                let denied: SessionDenied = response.json().await?;
                debug!(identity, cost = %denied.cost, "session denied");
                Ok(SessionOutcome::Denied(denied))
            }
            _ => Err(failed(response).await),
        }
    }

    pub async fn submit_score(&self, submission: &SubmitScore) -> Result<ScoreAccepted> {
        self.post_score(&submission.to_wire(None)?).await
    }

    /// Sign the canonical score message with `wallet` and submit.
    pub async fn submit_signed_score(
        &self,
        submission: &SubmitScore,
        wallet: &LocalWallet,
    ) -> Result<ScoreAccepted> {
        let message = score_message(&submission.session_token, submission.score);
        let signature = wallet.sign_message(message).await?.to_string();
        let signature = format!("0x{}", signature.trim_start_matches("0x"));
        self.post_score(&submission.to_wire(Some(signature))?).await
    }

    async fn post_score(&self, submission: &ScoreSubmission) -> Result<ScoreAccepted> {
        let response = self
            .http_client
            .post(self.endpoint("score")?)
            .json(submission)
            .send()
            .await?;
        parse_ok(response).await
    }

    pub async fn leaderboard(&self, query: &LeaderboardQuery) -> Result<LeaderboardPage> {
        let response = self
            .http_client
            .get(self.endpoint("leaderboard")?)
            .query(query)
            .send()
            .await?;
        parse_ok(response).await
    }

    pub async fn healthz(&self) -> Result<()> {
        let response = self
            .http_client
            .get(self.endpoint("healthz")?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Failed(response.status()));
        }
        Ok(())
    }
}

async fn parse_ok<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if response.status() != reqwest::StatusCode::OK {
        return Err(failed(response).await);
    }
    Ok(response.json().await?)
}

async fn failed(response: reqwest::Response) -> Error {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => Error::FailedWithBody { status, body },
        _ => Error::Failed(status),
    }
}
