use serde::{Deserialize, Deserializer, Serialize};

// -- Submission --

/// Signed challenge posted by the wallet client to any front door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub address: String,
    pub message: String,
    pub signature: String,
    #[serde(default)]
    pub public_key: Option<String>,
    /// Telegram ids arrive as numbers, session ids as strings.
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    /// Challenge issue time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Int(i64),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s,
        Repr::Int(n) => n.to_string(),
    })
}

// -- HTTP receiver --

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub verified: bool,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since the server started.
    pub uptime: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub address: String,
    pub nonce: String,
    pub issued_at: i64,
    pub user_id: String,
    pub message: String,
}

// -- Serverless handler --

/// Body of the serverless-style `/api/verify` endpoint. Failures carry
/// `error` and no `code`; successes carry `code` and no `error`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
