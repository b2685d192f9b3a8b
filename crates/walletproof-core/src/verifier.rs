use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use walletproof_types::api::Submission;

/// MintGarden signature verification endpoint.
pub const DEFAULT_VERIFIER_URL: &str = "https://api.mintgarden.io/address/verify_signature";

pub const REASON_INVALID: &str = "Signature invalid";
pub const REASON_UNREACHABLE: &str = "verification service unreachable";
pub const REASON_MALFORMED: &str = "malformed verification response";

/// Payload sent to the verification service.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyRequest {
    pub address: String,
    pub message: String,
    pub signature: String,
    pub pubkey: Option<String>,
}

impl From<&Submission> for VerifyRequest {
    fn from(s: &Submission) -> Self {
        Self {
            address: s.address.clone(),
            message: s.message.clone(),
            signature: s.signature.clone(),
            pubkey: s.public_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub reason: Option<String>,
}

impl VerifyOutcome {
    pub fn verified() -> Self {
        Self { verified: true, reason: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { verified: false, reason: Some(reason.into()) }
    }
}

/// Checks a wallet signature over a challenge message.
///
/// Expected failure modes (bad signature, service errors) come back as a
/// failed [`VerifyOutcome`]. `Err` is reserved for faults the implementation
/// could not classify, including running out of time.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome>;
}

/// Thin client for a remote verification service speaking
/// `{address, message, signature, pubkey}` -> `{verified}`.
pub struct HttpVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVerifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("walletproof/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl SignatureVerifier for HttpVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome> {
        debug!("Verifying signature for {} via {}", request.address, self.endpoint);

        let response = match self.client.post(&self.endpoint).json(request).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => bail!("verification request timed out"),
            Err(e) => {
                warn!("Verification request failed: {}", e);
                return Ok(VerifyOutcome::failed(REASON_UNREACHABLE));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Verification service error {}: {}", status.as_u16(), body);
            return Ok(VerifyOutcome::failed(format!("API error: {}", status.as_u16())));
        }

        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) if e.is_timeout() => bail!("verification response timed out"),
            Err(e) => {
                warn!("Unreadable verification response: {}", e);
                return Ok(VerifyOutcome::failed(REASON_MALFORMED));
            }
        };

        match body.get("verified") {
            Some(serde_json::Value::Bool(true)) => Ok(VerifyOutcome::verified()),
            Some(serde_json::Value::Bool(false)) | Some(serde_json::Value::Null) | None => {
                Ok(VerifyOutcome::failed(REASON_INVALID))
            }
            Some(other) => {
                warn!("Unexpected `verified` value: {}", other);
                Ok(VerifyOutcome::failed(REASON_MALFORMED))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/verify", addr)
    }

    fn request() -> VerifyRequest {
        VerifyRequest {
            address: "xch1abc".into(),
            message: "Verify...".into(),
            signature: "sig1".into(),
            pubkey: Some("pk1".into()),
        }
    }

    fn verifier(url: String) -> HttpVerifier {
        HttpVerifier::new(url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn verified_true_is_success() {
        // Only vouch for the payload when the field names match the service contract.
        let url = serve(Router::new().route(
            "/verify",
            post(|Json(body): Json<Value>| async move {
                let ok = body["address"] == "xch1abc"
                    && body["message"] == "Verify..."
                    && body["signature"] == "sig1"
                    && body["pubkey"] == "pk1";
                Json(json!({ "verified": ok }))
            }),
        ))
        .await;

        let outcome = verifier(url).verify(&request()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::verified());
    }

    #[tokio::test]
    async fn verified_false_is_invalid_signature() {
        let url = serve(Router::new().route(
            "/verify",
            post(|| async { Json(json!({ "verified": false })) }),
        ))
        .await;

        let outcome = verifier(url).verify(&request()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::failed(REASON_INVALID));
    }

    #[tokio::test]
    async fn error_status_is_reported_with_code() {
        let url = serve(Router::new().route(
            "/verify",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        ))
        .await;

        let outcome = verifier(url).verify(&request()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::failed("API error: 502"));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let url = serve(Router::new().route("/verify", post(|| async { "<html>" }))).await;

        let outcome = verifier(url).verify(&request()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::failed(REASON_MALFORMED));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_failed_outcome() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = verifier(format!("http://{}/verify", addr))
            .verify(&request())
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::failed(REASON_UNREACHABLE));
    }

    #[tokio::test]
    async fn slow_service_is_a_timeout_fault() {
        let url = serve(Router::new().route(
            "/verify",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "verified": true }))
            }),
        ))
        .await;

        let slow = HttpVerifier::new(url, Duration::from_millis(200)).unwrap();
        let err = slow.verify(&request()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
