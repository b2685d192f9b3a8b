use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use walletproof_core::notifier::{Notice, VERIFY_PROMPT};
use walletproof_core::orchestrator::{Orchestrator, SubmitError};
use walletproof_core::telegram::{POLL_TIMEOUT_SECS, TelegramClient, Update, web_app_button};
use walletproof_types::api::Submission;

/// Pause before polling again after a failed `getUpdates`.
const RETRY_DELAY: Duration = Duration::from_secs(5);

const BUTTON_TEXT: &str = "🔗 Connect Sage Wallet";

/// What an incoming update asks the bot to do.
#[derive(Debug, PartialEq, Eq)]
pub enum BotAction {
    /// `/verify` or `/start`: reply with the Mini App button.
    Prompt { chat_id: String },
    /// Mini App returned a signed submission.
    Submit { chat_id: String, user_id: String, data: String },
    Ignore,
}

pub fn route(update: &Update) -> BotAction {
    let Some(message) = &update.message else {
        return BotAction::Ignore;
    };
    let chat_id = message.chat.id.to_string();

    if let Some(web_app) = &message.web_app_data {
        // Telegram vouches for `from`; the record is keyed by it.
        let user_id = message
            .from
            .as_ref()
            .map(|u| u.id)
            .unwrap_or(message.chat.id)
            .to_string();
        return BotAction::Submit {
            chat_id,
            user_id,
            data: web_app.data.clone(),
        };
    }

    let command = message
        .text
        .as_deref()
        .and_then(|t| t.split_whitespace().next())
        .and_then(|c| c.split('@').next());
    match command {
        Some("/verify") | Some("/start") => BotAction::Prompt { chat_id },
        _ => BotAction::Ignore,
    }
}

/// Why Mini App data was not processed.
#[derive(Debug)]
pub enum Rejection {
    Payload(serde_json::Error),
    Submit(SubmitError),
}

impl Rejection {
    /// Message the bot owes the chat. Store failures were already announced
    /// by the orchestrator.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Payload(_) | Self::Submit(SubmitError::Invalid(_)) => Some(Notice::Internal),
            Self::Submit(SubmitError::Internal) => None,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Payload(e) => write!(f, "unreadable payload: {}", e),
            Self::Submit(e) => write!(f, "{}", e),
        }
    }
}

/// Decode Mini App data, binding it to the Telegram sender.
pub fn parse_submission(data: &str, user_id: &str) -> serde_json::Result<Submission> {
    let mut submission: Submission = serde_json::from_str(data)?;
    submission.user_id = user_id.to_string();
    Ok(submission)
}

/// Long-poll Telegram for commands and Mini App results until the process exits.
///
/// Each update is handled on its own task so one slow verification does not
/// hold up other chats.
pub async fn run_bot_loop(client: TelegramClient, orchestrator: Arc<Orchestrator>, webapp_url: String) {
    info!("Bot listener started, Mini App at {}", webapp_url);
    let mut offset: Option<i64> = None;

    loop {
        let updates = match client.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("getUpdates failed: {:#}", e);
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let action = route(&update);
            if action == BotAction::Ignore {
                continue;
            }
            tokio::spawn(handle_action(
                client.clone(),
                orchestrator.clone(),
                webapp_url.clone(),
                action,
            ));
        }
    }
}

async fn handle_action(
    client: TelegramClient,
    orchestrator: Arc<Orchestrator>,
    webapp_url: String,
    action: BotAction,
) {
    match action {
        BotAction::Prompt { chat_id } => {
            info!("/verify requested in chat {}", chat_id);
            let button = web_app_button(BUTTON_TEXT, &webapp_url);
            if let Err(e) = client.send_message(&chat_id, VERIFY_PROMPT, Some(button)).await {
                warn!("Failed to send verification button to {}: {:#}", chat_id, e);
            }
        }
        BotAction::Submit { chat_id, user_id, data } => {
            info!("Mini App data received from user {}", user_id);
            let result = match parse_submission(&data, &user_id) {
                Ok(submission) => orchestrator
                    .submit(submission, &chat_id)
                    .await
                    .map_err(Rejection::Submit),
                Err(e) => Err(Rejection::Payload(e)),
            };

            match result {
                Ok(outcome) => info!(
                    "Bot verification for user {} ended {}",
                    outcome.user_id, outcome.status
                ),
                Err(rejection) => {
                    warn!("Rejected Mini App data from user {}: {}", user_id, rejection);
                    if let Some(notice) = rejection.notice() {
                        if let Err(e) = client.send_message(&chat_id, &notice.render(), None).await {
                            warn!("Failed to notify chat {}: {:#}", chat_id, e);
                        }
                    }
                }
            }
        }
        BotAction::Ignore => {}
    }
}
