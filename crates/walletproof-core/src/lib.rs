//! Wallet ownership verification core.
//!
//! A client asks for a [`challenge::Challenge`], has the wallet sign it, and
//! posts the signed result. The [`orchestrator::Orchestrator`] checks
//! freshness, asks the external [`verifier::SignatureVerifier`], commits the
//! outcome to the store and tells the user through a [`notifier::Notifier`].

pub mod challenge;
pub mod notifier;
pub mod orchestrator;
pub mod session;
pub mod submission;
pub mod telegram;
pub mod verifier;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
