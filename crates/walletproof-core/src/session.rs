use thiserror::Error;
use walletproof_types::api::Submission;

use crate::challenge::Challenge;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("malformed account identifier: {0}")]
    BadAccount(String),

    #[error("no wallet connected")]
    NotConnected,

    #[error("no challenge issued")]
    NoChallenge,

    #[error("empty signature")]
    EmptySignature,
}

/// State of one Mini App session: connect a wallet, issue a challenge,
/// turn the wallet's signature into a submission.
///
/// Each session owns its own account and challenge; nothing is shared
/// between users.
#[derive(Debug, Clone)]
pub struct WalletSession {
    user_id: String,
    chain: Option<String>,
    address: Option<String>,
    challenge: Option<Challenge>,
}

impl WalletSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chain: None,
            address: None,
            challenge: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Chain of the connected account, e.g. `chia:mainnet`.
    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref()
    }

    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    /// Attach a CAIP-10 account (`namespace:reference:address`) as returned
    /// by WalletConnect. Any outstanding challenge is discarded.
    pub fn connect(&mut self, account: &str) -> Result<&str, SessionError> {
        let mut parts = account.splitn(3, ':');
        let (Some(namespace), Some(reference), Some(address)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::BadAccount(account.to_string()));
        };
        if namespace.is_empty() || reference.is_empty() || address.is_empty() || address.contains(':') {
            return Err(SessionError::BadAccount(account.to_string()));
        }

        self.chain = Some(format!("{}:{}", namespace, reference));
        self.challenge = None;
        Ok(self.address.insert(address.to_string()).as_str())
    }

    /// Issue a fresh challenge for the connected address, replacing any
    /// previous one.
    pub fn issue_challenge(&mut self) -> Result<&Challenge, SessionError> {
        let address = self.address.as_deref().ok_or(SessionError::NotConnected)?;
        let challenge = Challenge::generate(address, &self.user_id);
        Ok(&*self.challenge.insert(challenge))
    }

    /// Build the submission for a signature over the current challenge.
    /// The challenge is consumed: a second call needs a new one.
    pub fn into_submission(
        &mut self,
        signature: &str,
        public_key: Option<&str>,
    ) -> Result<Submission, SessionError> {
        if signature.trim().is_empty() {
            return Err(SessionError::EmptySignature);
        }
        let challenge = self.challenge.take().ok_or(SessionError::NoChallenge)?;
        Ok(Submission {
            address: challenge.address,
            message: challenge.message,
            signature: signature.to_string(),
            public_key: public_key.map(str::to_string),
            user_id: challenge.user_id,
            timestamp: challenge.issued_at,
        })
    }

    pub fn disconnect(&mut self) {
        self.chain = None;
        self.address = None;
        self.challenge = None;
    }
}
