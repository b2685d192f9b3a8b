use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use rand::Rng;
use tracing::{info, warn};

use walletproof_core::orchestrator::SubmitError;
use walletproof_core::verifier::REASON_INVALID;
use walletproof_types::api::{ConfirmationResponse, ErrorResponse, Submission};

use crate::AppState;

/// Ambiguous glyphs (0/O, 1/I) are left out so codes read back cleanly.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 8;

fn refuse(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ConfirmationResponse>) {
    (
        status,
        Json(ConfirmationResponse {
            verified: false,
            address: None,
            code: None,
            error: Some(error.into()),
        }),
    )
}

/// POST /api/verify: Mini App endpoint answering with a confirmation code.
pub async fn verify(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<ConfirmationResponse>) {
    let submission: Submission = match serde_json::from_slice(&body) {
        Ok(s) => s,
        Err(e) => {
            warn!("Rejected serverless payload: {}", e);
            return refuse(StatusCode::BAD_REQUEST, "Invalid request");
        }
    };

    let chat_id = submission.user_id.clone();
    match state.orchestrator.submit(submission, &chat_id).await {
        Ok(outcome) if outcome.is_verified() => {
            let code = confirmation_code();
            info!("Issued confirmation code {} to user {}", code, outcome.user_id);
            (
                StatusCode::OK,
                Json(ConfirmationResponse {
                    verified: true,
                    address: Some(outcome.address),
                    code: Some(code),
                    error: None,
                }),
            )
        }
        Ok(outcome) => refuse(
            StatusCode::BAD_REQUEST,
            outcome.error.unwrap_or_else(|| REASON_INVALID.to_string()),
        ),
        Err(SubmitError::Invalid(e)) => refuse(StatusCode::BAD_REQUEST, e.to_string()),
        Err(SubmitError::Internal) => refuse(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    }
}

pub async fn method_not_allowed() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new("Method not allowed")),
    )
}

/// Short human-readable token shown to the user after a successful check.
pub fn confirmation_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
