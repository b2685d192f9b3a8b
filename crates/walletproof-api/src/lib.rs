//! HTTP front doors for the verification flow: the plain receiver
//! (`/verify`, `/status`, `/health`, `/challenge`) and the serverless-style
//! `/api/verify` handler. Both only translate HTTP to and from the shared
//! [`Orchestrator`].

pub mod receiver;
pub mod serverless;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use walletproof_core::orchestrator::Orchestrator;
use walletproof_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<Database>,
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: Instant,
}

impl AppStateInner {
    pub fn new(store: Arc<Database>, orchestrator: Arc<Orchestrator>) -> AppState {
        Arc::new(Self {
            store,
            orchestrator,
            started_at: Instant::now(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    // Mini Apps are served from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/verify", post(receiver::verify))
        .route("/status/{user_id}", get(receiver::status))
        .route("/status/{user_id}/history", get(receiver::history))
        .route("/challenge", post(receiver::challenge))
        .route("/health", get(receiver::health))
        .route(
            "/api/verify",
            post(serverless::verify).fallback(serverless::method_not_allowed),
        )
        .layer(cors)
        .with_state(state)
}

/// Run a read against the store off the async runtime.
pub(crate) async fn read_store<F, T>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.store.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use walletproof_core::notifier::Notifier;
    use walletproof_core::orchestrator::Policy;
    use walletproof_core::verifier::{SignatureVerifier, VerifyOutcome, VerifyRequest};

    struct StubVerifier {
        answer: VerifyOutcome,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SignatureVerifier for StubVerifier {
        async fn verify(&self, _request: &VerifyRequest) -> anyhow::Result<VerifyOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct TestApp {
        _dir: TempDir,
        router: Router,
        verifier: Arc<StubVerifier>,
        notifier: Arc<RecordingNotifier>,
    }

    /// Router over a temporary store and a verifier that always answers `answer`.
    fn test_app(answer: VerifyOutcome) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Database::open(&dir.path().join("api.db")).unwrap());
        let verifier = Arc::new(StubVerifier { answer, calls: AtomicUsize::new(0) });
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            verifier.clone(),
            notifier.clone(),
            Policy::default(),
        ));
        TestApp {
            _dir: dir,
            router: router(AppStateInner::new(store, orchestrator)),
            verifier,
            notifier,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn post_raw(router: &Router, path: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(router, req).await
    }

    async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        post_raw(router, path, &body.to_string()).await
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn submission(timestamp: i64) -> Value {
        json!({
            "address": "xch1abc",
            "message": "Verify...",
            "signature": "sig1",
            "publicKey": "pk1",
            "userId": 42,
            "timestamp": timestamp,
        })
    }

    // -- Receiver --------------------------------------------------------

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_app(VerifyOutcome::verified());
        let (status, body) = get(&app.router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn verified_submission_is_visible_through_status() {
        let app = test_app(VerifyOutcome::verified());

        let (status, body) = post_json(&app.router, "/verify", submission(now_ms())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "verified": true, "address": "xch1abc" }));

        let (status, record) = get(&app.router, "/status/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "verified");
        assert_eq!(record["address"], "xch1abc");
        assert!(record["verifiedAt"].is_i64());
        assert!(record.get("error").is_none());

        let sent = app.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "42");
    }

    #[tokio::test]
    async fn stale_submission_fails_as_expired_without_verifier_call() {
        let app = test_app(VerifyOutcome::verified());
        let six_minutes_ago = now_ms() - 6 * 60 * 1000;

        let (status, body) = post_json(&app.router, "/verify", submission(six_minutes_ago)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], false);

        let (_, record) = get(&app.router, "/status/42").await;
        assert_eq!(record["status"], "failed");
        assert_eq!(record["error"], "expired");
        assert_eq!(app.verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_verification_still_answers_200() {
        let app = test_app(VerifyOutcome::failed("Signature invalid"));

        let (status, body) = post_json(&app.router, "/verify", submission(now_ms())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["verified"], false);
        assert_eq!(body["address"], "xch1abc");
    }

    #[tokio::test]
    async fn malformed_json_is_rejected_without_record() {
        let app = test_app(VerifyOutcome::verified());

        let (status, body) = post_raw(&app.router, "/verify", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let mut incomplete = submission(now_ms());
        incomplete["signature"] = json!("");
        let (status, body) = post_json(&app.router, "/verify", incomplete).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing field: signature");

        let (status, _) = get(&app.router, "/status/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let app = test_app(VerifyOutcome::verified());
        let (status, body) = get(&app.router, "/status/999").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn history_lists_attempt_events() {
        let app = test_app(VerifyOutcome::verified());
        post_json(&app.router, "/verify", submission(now_ms())).await;

        let (status, body) = get(&app.router, "/status/42/history").await;
        assert_eq!(status, StatusCode::OK);
        let events: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event"].as_str().unwrap())
            .collect();
        assert_eq!(events, vec!["received", "verified"]);
    }

    #[tokio::test]
    async fn issued_challenge_round_trips_through_verify() {
        let app = test_app(VerifyOutcome::verified());

        let (status, challenge) = post_json(
            &app.router,
            "/challenge",
            json!({ "address": "xch1abc", "userId": 42 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(challenge["userId"], "42");
        let message = challenge["message"].as_str().unwrap();
        assert!(message.contains(challenge["nonce"].as_str().unwrap()));

        let signed = json!({
            "address": "xch1abc",
            "message": message,
            "signature": "sig1",
            "publicKey": null,
            "userId": 42,
            "timestamp": challenge["issuedAt"],
        });
        let (status, body) = post_json(&app.router, "/verify", signed.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);

        // Replaying the same signed challenge is answered from the store.
        let (status, body) = post_json(&app.router, "/verify", signed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);
        assert_eq!(app.verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn challenge_requires_address() {
        let app = test_app(VerifyOutcome::verified());
        let (status, _) = post_json(
            &app.router,
            "/challenge",
            json!({ "address": "", "userId": "42" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let app = test_app(VerifyOutcome::verified());
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/verify")
            .header("origin", "https://miniapp.example")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        let methods = headers["access-control-allow-methods"].to_str().unwrap();
        assert!(methods.contains("POST") && methods.contains("GET") && methods.contains("OPTIONS"));
    }

    // -- Serverless ------------------------------------------------------

    #[tokio::test]
    async fn serverless_success_returns_code() {
        let app = test_app(VerifyOutcome::verified());

        let (status, body) = post_json(&app.router, "/api/verify", submission(now_ms())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);
        assert_eq!(body["address"], "xch1abc");
        assert_eq!(body["code"].as_str().unwrap().len(), 8);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn serverless_failure_is_400_with_reason() {
        let app = test_app(VerifyOutcome::failed("Signature invalid"));

        let (status, body) = post_json(&app.router, "/api/verify", submission(now_ms())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "verified": false, "error": "Signature invalid" }));
    }

    #[tokio::test]
    async fn serverless_rejects_other_methods() {
        let app = test_app(VerifyOutcome::verified());
        let (status, body) = get(&app.router, "/api/verify").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "Method not allowed");
    }
}
