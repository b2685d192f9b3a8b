use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::notifier::Notifier;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Long-poll window requested from `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Minimal Telegram Bot API client: just what the verification flow needs.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub web_app_data: Option<WebAppData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Payload a Mini App hands back through `Telegram.WebApp.sendData`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebAppData {
    pub data: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(DEFAULT_API_BASE, token)
    }

    pub fn with_api_base(api_base: &str, token: &str) -> Result<Self> {
        // Must outlive the getUpdates long poll.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()?;
        Ok(Self {
            http,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await
            // The URL embeds the bot token; keep it out of error messages.
            .map_err(|e| anyhow!("Telegram {} request failed: {}", method, e.without_url()))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| anyhow!("Telegram {} returned an unreadable body: {}", method, e.without_url()))?;

        if !envelope.ok {
            bail!(
                "Telegram {} failed: {}",
                method,
                envelope.description.unwrap_or_else(|| "no description".into())
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("Telegram {} returned no result", method))
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let _: Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", &body).await
    }
}

/// Inline keyboard with a single button that opens the Mini App.
pub fn web_app_button(text: &str, url: &str) -> Value {
    json!({
        "inline_keyboard": [[{ "text": text, "web_app": { "url": url } }]]
    })
}

/// Sends outcome messages as Telegram chat messages.
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()> {
        self.client.send_message(chat_id, text, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::post};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn fake_api(captured: Captured) -> String {
        let router = Router::new()
            .route(
                "/bottest-token/sendMessage",
                post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                    c.lock().unwrap().push(body);
                    Json(json!({ "ok": true, "result": { "message_id": 1 } }))
                }),
            )
            .route(
                "/bottest-token/getUpdates",
                post(|| async {
                    Json(json!({
                        "ok": true,
                        "result": [{
                            "update_id": 900,
                            "message": {
                                "message_id": 5,
                                "from": { "id": 42, "username": "alice" },
                                "chat": { "id": 4242 },
                                "web_app_data": { "data": "{\"address\":\"xch1abc\"}", "button_text": "Connect" }
                            }
                        }]
                    }))
                }),
            )
            .route(
                "/botbad-token/sendMessage",
                post(|| async {
                    Json(json!({ "ok": false, "description": "Unauthorized" }))
                }),
            )
            .with_state(captured);
        serve(router).await
    }

    #[tokio::test]
    async fn send_message_posts_markdown_text() {
        let captured = Captured::default();
        let base = fake_api(captured.clone()).await;
        let client = TelegramClient::with_api_base(&base, "test-token").unwrap();

        client
            .send_message("42", "hello", Some(web_app_button("Open", "https://app.example")))
            .await
            .unwrap();

        let sent = captured.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["chat_id"], "42");
        assert_eq!(sent[0]["parse_mode"], "Markdown");
        assert_eq!(
            sent[0]["reply_markup"]["inline_keyboard"][0][0]["web_app"]["url"],
            "https://app.example"
        );
    }

    #[tokio::test]
    async fn get_updates_parses_web_app_data() {
        let base = fake_api(Captured::default()).await;
        let client = TelegramClient::with_api_base(&base, "test-token").unwrap();

        let updates = client.get_updates(None, 0).await.unwrap();
        assert_eq!(updates.len(), 1);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.from.as_ref().unwrap().id, 42);
        assert_eq!(message.chat.id, 4242);
        assert!(message.web_app_data.as_ref().unwrap().data.contains("xch1abc"));
    }

    #[tokio::test]
    async fn api_refusal_surfaces_as_error() {
        let base = fake_api(Captured::default()).await;
        let notifier = TelegramNotifier::new(TelegramClient::with_api_base(&base, "bad-token").unwrap());

        let err = notifier.notify("42", "hello").await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }
}
