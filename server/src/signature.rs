use arcade_types::{score_message, Identity};
use ethers::types::{Address, Signature};
use std::str::FromStr;

use crate::config::SignatureMode;
use crate::error::AuthError;

/// Proof that a submission was authorized by the holder of its identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureVerifier {
    /// Accept every submission; the session token alone binds the score.
    None,
    /// The identity is an EVM address that must have signed
    /// `session:<token>:score:<score>` (EIP-191 personal message).
    WalletSignature,
}

impl From<SignatureMode> for SignatureVerifier {
    fn from(mode: SignatureMode) -> Self {
        match mode {
            SignatureMode::None => Self::None,
            SignatureMode::Wallet => Self::WalletSignature,
        }
    }
}

impl SignatureVerifier {
    pub fn verify(
        &self,
        identity: &Identity,
        session_token: &str,
        score: u64,
        signature: Option<&str>,
    ) -> Result<(), AuthError> {
        match self {
            Self::None => Ok(()),
            Self::WalletSignature => {
                let signature = signature
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(AuthError::MissingSignature)?;
                let address =
                    Address::from_str(identity.as_str()).map_err(|_| AuthError::NotAnAddress)?;
                let signature = Signature::from_str(signature)
                    .map_err(|err| AuthError::MalformedSignature(err.to_string()))?;
                let message = score_message(session_token, score);
                signature
                    .verify(message.as_str(), address)
                    .map_err(|_| AuthError::SignatureMismatch)
            }
        }
    }
}
