use walletproof_types::api::ChallengeResponse;

const HEADER: &str = "Verify ownership of Chia wallet:";

/// A message the wallet signs to prove it controls `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub address: String,
    pub nonce: String,
    /// Milliseconds since the Unix epoch.
    pub issued_at: i64,
    pub user_id: String,
    pub message: String,
}

impl Challenge {
    /// Issue a fresh challenge with a random 128-bit nonce.
    pub fn generate(address: &str, user_id: &str) -> Self {
        Self::generate_at(address, user_id, crate::now_ms())
    }

    pub fn generate_at(address: &str, user_id: &str, issued_at: i64) -> Self {
        let nonce_bytes: [u8; 16] = rand::random();
        Self::from_parts(address, &hex::encode(nonce_bytes), issued_at, user_id)
    }

    /// Assemble a challenge from known fields. The message is fully
    /// determined by them.
    pub fn from_parts(address: &str, nonce: &str, issued_at: i64, user_id: &str) -> Self {
        Self {
            address: address.to_string(),
            nonce: nonce.to_string(),
            issued_at,
            user_id: user_id.to_string(),
            message: render(address, nonce, issued_at, user_id),
        }
    }

    /// Recover a challenge from its rendered message.
    ///
    /// Returns `None` unless `message` is exactly what [`render`] would
    /// produce for the parsed fields.
    pub fn parse(message: &str) -> Option<Self> {
        let lines: Vec<&str> = message.split('\n').collect();
        let [header, address, blank, timestamp, nonce, user] = lines.as_slice() else {
            return None;
        };
        if *header != HEADER || !blank.is_empty() || address.is_empty() {
            return None;
        }

        let issued_at = timestamp.strip_prefix("Timestamp: ")?.parse().ok()?;
        let nonce = nonce.strip_prefix("Nonce: ")?;
        let user_id = user.strip_prefix("User: ")?;
        if nonce.is_empty() {
            return None;
        }

        let challenge = Self::from_parts(address, nonce, issued_at, user_id);
        (challenge.message == message).then_some(challenge)
    }
}

impl From<Challenge> for ChallengeResponse {
    fn from(c: Challenge) -> Self {
        ChallengeResponse {
            address: c.address,
            nonce: c.nonce,
            issued_at: c.issued_at,
            user_id: c.user_id,
            message: c.message,
        }
    }
}

/// Canonical newline-delimited challenge text.
pub fn render(address: &str, nonce: &str, issued_at: i64, user_id: &str) -> String {
    format!(
        "{}\n{}\n\nTimestamp: {}\nNonce: {}\nUser: {}",
        HEADER, address, issued_at, nonce, user_id
    )
}
