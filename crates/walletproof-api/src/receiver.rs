use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{error, warn};

use walletproof_core::challenge::Challenge;
use walletproof_core::orchestrator::SubmitError;
use walletproof_types::api::{
    ChallengeRequest, ChallengeResponse, ErrorResponse, HealthResponse, Submission, VerifyResponse,
};
use walletproof_types::models::{AuditEntry, VerificationRecord};

use crate::{AppState, read_store};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// POST /verify: signed submission from the Mini App.
///
/// Well-formed input always answers 200; a failed verification shows up as
/// `verified: false`.
pub async fn verify(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<VerifyResponse>, ApiError> {
    let submission: Submission = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected verification payload: {}", e);
        reject(StatusCode::BAD_REQUEST, "Invalid request")
    })?;

    let chat_id = submission.user_id.clone();
    match state.orchestrator.submit(submission, &chat_id).await {
        Ok(outcome) => Ok(Json(VerifyResponse {
            success: outcome.is_verified(),
            verified: outcome.is_verified(),
            address: outcome.address,
        })),
        Err(SubmitError::Invalid(e)) => Err(reject(StatusCode::BAD_REQUEST, e.to_string())),
        Err(SubmitError::Internal) => {
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

/// GET /status/{user_id}: latest record for a user.
pub async fn status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<VerificationRecord>, ApiError> {
    read_store(&state, move |db| db.get(&user_id))
        .await
        .map_err(|e| {
            error!("Status lookup failed: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Not found"))
}

/// GET /status/{user_id}/history: audit trail of every attempt.
pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    read_store(&state, move |db| db.history(&user_id))
        .await
        .map(Json)
        .map_err(|e| {
            error!("History lookup failed: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })
}

/// POST /challenge: issue a challenge for the wallet to sign.
pub async fn challenge(body: Bytes) -> Result<Json<ChallengeResponse>, ApiError> {
    let req: ChallengeRequest = serde_json::from_slice(&body)
        .map_err(|_| reject(StatusCode::BAD_REQUEST, "Invalid request"))?;

    if req.address.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "missing field: address"));
    }
    if req.user_id.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "missing field: userId"));
    }

    Ok(Json(Challenge::generate(&req.address, &req.user_id).into()))
}

/// GET /health: liveness check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}
