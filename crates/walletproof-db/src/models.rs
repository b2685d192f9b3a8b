use walletproof_types::models::VerificationStatus;

/// Result of registering a new signed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// First sighting of this `(user_id, nonce)`; a pending record was written.
    Started,
    /// The attempt was already seen. Carries its current state.
    Duplicate(AttemptState),
}

/// Terminal outcome applied to a pending attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Verified { at: i64 },
    Failed { error: String, at: i64 },
}

impl Resolution {
    pub fn status(&self) -> VerificationStatus {
        match self {
            Self::Verified { .. } => VerificationStatus::Verified,
            Self::Failed { .. } => VerificationStatus::Failed,
        }
    }

    pub fn at(&self) -> i64 {
        match self {
            Self::Verified { at } | Self::Failed { at, .. } => *at,
        }
    }
}

/// What `resolve` did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Attempt resolved and the user's live record updated.
    Applied,
    /// Attempt resolved in the audit log, but a newer attempt owns the live record.
    Superseded,
    /// Attempt had already reached a terminal state; nothing written.
    AlreadyResolved,
}

/// State of one attempt as reconstructed from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    pub status: VerificationStatus,
    pub error: Option<String>,
    pub at: i64,
}
