use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use walletproof_db::Database;
use walletproof_db::models::{BeginOutcome, Resolution, Transition};
use walletproof_types::api::Submission;
use walletproof_types::models::VerificationStatus;

use crate::notifier::{Notice, Notifier};
use crate::submission::{Attempt, SubmissionError};
use crate::verifier::{REASON_INVALID, SignatureVerifier, VerifyRequest};

pub const EXPIRED: &str = "expired";
pub const INTERNAL_ERROR: &str = "internal error";

/// Tunables of the verification pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Oldest challenge accepted, measured from its issue time.
    pub max_age: Duration,
    /// Upper bound on the external verification call.
    pub verify_timeout: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            verify_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] SubmissionError),

    #[error("internal error")]
    Internal,
}

/// Final state of a submission as seen by the transport adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub user_id: String,
    pub address: String,
    pub status: VerificationStatus,
    pub error: Option<String>,
    /// The attempt had been submitted before; its stored result was returned.
    pub replayed: bool,
}

impl Outcome {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Drives one submission through received -> pending -> verified | failed.
pub struct Orchestrator {
    store: Arc<Database>,
    verifier: Arc<dyn SignatureVerifier>,
    notifier: Arc<dyn Notifier>,
    policy: Policy,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Database>,
        verifier: Arc<dyn SignatureVerifier>,
        notifier: Arc<dyn Notifier>,
        policy: Policy,
    ) -> Self {
        Self { store, verifier, notifier, policy }
    }

    /// Process a signed submission and report the outcome to `chat_id`.
    ///
    /// Only malformed input and store failures return `Err`; every
    /// verification failure is an `Ok` outcome with status `failed`.
    /// Store failures have already been announced to `chat_id` when this
    /// returns.
    pub async fn submit(&self, submission: Submission, chat_id: &str) -> Result<Outcome, SubmitError> {
        let payload = match serde_json::to_string(&submission) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize submission: {}", e);
                self.deliver(chat_id, &Notice::Internal).await;
                return Err(SubmitError::Internal);
            }
        };
        let attempt = Attempt::from_submission(submission)?;
        let user_id = attempt.user_id().to_string();
        let nonce = attempt.nonce.clone();
        let address = attempt.submission.address.clone();

        info!("Verification received from user {} for {}", user_id, address);

        let record = attempt.pending_record(crate::now_ms());
        let begin = match self.blocking(move |db| db.begin(&record, &payload)).await {
            Ok(begin) => begin,
            Err(e) => {
                self.deliver(chat_id, &Notice::Internal).await;
                return Err(e);
            }
        };

        if let BeginOutcome::Duplicate(state) = begin {
            info!(
                "Replayed attempt {} for user {} answered from store ({})",
                nonce, user_id, state.status
            );
            return Ok(Outcome {
                user_id,
                address,
                status: state.status,
                error: state.error,
                replayed: true,
            });
        }

        let (resolution, notice) = self.evaluate(&attempt).await;
        let status = resolution.status();
        let error_reason = match &resolution {
            Resolution::Failed { error, .. } => Some(error.clone()),
            Resolution::Verified { .. } => None,
        };

        let (uid, n) = (user_id.clone(), nonce.clone());
        let transition = self.blocking(move |db| db.resolve(&uid, &n, &resolution)).await;

        match transition {
            Ok(Transition::Applied) => {}
            Ok(Transition::Superseded) => {
                info!("Attempt {} for user {} resolved behind a newer attempt", nonce, user_id);
            }
            Ok(Transition::AlreadyResolved) => {
                warn!("Attempt {} for user {} was already resolved", nonce, user_id);
                return Ok(Outcome {
                    user_id,
                    address,
                    status,
                    error: error_reason,
                    replayed: true,
                });
            }
            Err(e) => {
                self.abandon(&user_id, &nonce).await;
                self.deliver(chat_id, &Notice::Internal).await;
                return Err(e);
            }
        }

        match status {
            VerificationStatus::Verified => info!("User {} verified {}", user_id, address),
            _ => info!(
                "Verification for user {} failed: {}",
                user_id,
                error_reason.as_deref().unwrap_or("unknown")
            ),
        }

        self.deliver(chat_id, &notice).await;

        Ok(Outcome {
            user_id,
            address,
            status,
            error: error_reason,
            replayed: false,
        })
    }

    /// Freshness gate, then the external check.
    async fn evaluate(&self, attempt: &Attempt) -> (Resolution, Notice) {
        let now = crate::now_ms();
        if !is_fresh(attempt.submission.timestamp, now, self.policy.max_age) {
            warn!(
                "Challenge for user {} expired (issued {}, now {})",
                attempt.user_id(),
                attempt.submission.timestamp,
                now
            );
            return failed(EXPIRED, Notice::Expired);
        }

        let request = VerifyRequest::from(&attempt.submission);
        let verdict =
            tokio::time::timeout(self.policy.verify_timeout, self.verifier.verify(&request)).await;

        match verdict {
            Ok(Ok(outcome)) if outcome.verified => (
                Resolution::Verified { at: crate::now_ms() },
                Notice::Verified { address: attempt.submission.address.clone() },
            ),
            Ok(Ok(outcome)) => {
                let reason = outcome.reason.unwrap_or_else(|| REASON_INVALID.to_string());
                failed(&reason, Notice::Failed { reason: reason.clone() })
            }
            Ok(Err(e)) => {
                error!("Verifier error for user {}: {:#}", attempt.user_id(), e);
                failed(INTERNAL_ERROR, Notice::Internal)
            }
            Err(_) => {
                warn!(
                    "Verifier timed out after {:?} for user {}",
                    self.policy.verify_timeout,
                    attempt.user_id()
                );
                failed(INTERNAL_ERROR, Notice::Internal)
            }
        }
    }

    /// Close an attempt whose outcome could not be committed, so a resubmission
    /// is not answered with `pending` forever.
    async fn abandon(&self, user_id: &str, nonce: &str) {
        let fallback = Resolution::Failed {
            error: INTERNAL_ERROR.to_string(),
            at: crate::now_ms(),
        };
        let (uid, n) = (user_id.to_string(), nonce.to_string());
        match self.blocking(move |db| db.resolve(&uid, &n, &fallback)).await {
            Ok(_) => warn!("Attempt {} for user {} closed as {}", nonce, user_id, INTERNAL_ERROR),
            Err(_) => error!("Attempt {} for user {} is stranded in pending", nonce, user_id),
        }
    }

    async fn deliver(&self, chat_id: &str, notice: &Notice) {
        if let Err(e) = self.notifier.notify(chat_id, &notice.render()).await {
            warn!("Failed to notify chat {}: {:#}", chat_id, e);
        }
    }

    /// Run a store call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, SubmitError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.store.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                SubmitError::Internal
            })?
            .map_err(|e| {
                error!("Store error: {:#}", e);
                SubmitError::Internal
            })
    }
}

fn failed(reason: &str, notice: Notice) -> (Resolution, Notice) {
    (
        Resolution::Failed { error: reason.to_string(), at: crate::now_ms() },
        notice,
    )
}

/// `0 <= now - issued_at <= max_age`, all in milliseconds.
pub fn is_fresh(issued_at: i64, now: i64, max_age: Duration) -> bool {
    let age = now.saturating_sub(issued_at);
    age >= 0 && (age as u128) <= max_age.as_millis()
}
