use sha2::{Digest, Sha256};
use thiserror::Error;
use walletproof_types::api::Submission;
use walletproof_types::models::{VerificationRecord, VerificationStatus};

use crate::challenge::Challenge;

/// Why a submission was refused before reaching the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("challenge does not match {0}")]
    ChallengeMismatch(&'static str),
}

/// A well-formed submission together with its replay key.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub submission: Submission,
    pub nonce: String,
}

impl Attempt {
    pub fn from_submission(mut submission: Submission) -> Result<Self, SubmissionError> {
        require(&submission.address, "address")?;
        require(&submission.message, "message")?;
        require(&submission.signature, "signature")?;
        require(&submission.user_id, "userId")?;
        submission.public_key = submission.public_key.filter(|k| !k.trim().is_empty());

        let nonce = match Challenge::parse(&submission.message) {
            Some(challenge) => {
                if challenge.address != submission.address {
                    return Err(SubmissionError::ChallengeMismatch("address"));
                }
                if challenge.issued_at != submission.timestamp {
                    return Err(SubmissionError::ChallengeMismatch("timestamp"));
                }
                if challenge.user_id != submission.user_id {
                    return Err(SubmissionError::ChallengeMismatch("userId"));
                }
                challenge.nonce
            }
            None => digest_nonce(submission.timestamp, &submission.message),
        };

        Ok(Self { submission, nonce })
    }

    pub fn user_id(&self) -> &str {
        &self.submission.user_id
    }

    pub fn pending_record(&self, received_at: i64) -> VerificationRecord {
        let s = &self.submission;
        VerificationRecord {
            user_id: s.user_id.clone(),
            status: VerificationStatus::Pending,
            address: s.address.clone(),
            public_key: s.public_key.clone(),
            signature: s.signature.clone(),
            message: s.message.clone(),
            nonce: self.nonce.clone(),
            timestamp: s.timestamp,
            received_at,
            verified_at: None,
            error: None,
        }
    }
}

/// Replay key for a free-form message: the signed text at its issue time.
fn digest_nonce(timestamp: i64, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(message.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn require(value: &str, field: &'static str) -> Result<(), SubmissionError> {
    if value.trim().is_empty() {
        Err(SubmissionError::MissingField(field))
    } else {
        Ok(())
    }
}
