use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Delivers outcome messages to a chat.
///
/// Errors are reported to the caller so they can be logged; they never undo
/// a status change that was already committed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Logs outgoing messages instead of sending them. Used when no bot token
/// is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()> {
        info!("Would send to {}: {}", chat_id, text);
        Ok(())
    }
}

/// User-facing outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Verified { address: String },
    Failed { reason: String },
    Expired,
    Internal,
}

impl Notice {
    /// Telegram Markdown text for this outcome.
    pub fn render(&self) -> String {
        match self {
            Self::Verified { address } => format!(
                "✅ *Wallet Verified!*\n\n*Address:* `{}`\n\n\
                 You now have access to gated content and features.\n\n\
                 🔐 Cryptographically verified via CHIP-0002",
                address
            ),
            Self::Failed { reason } => {
                format!("❌ *Verification Failed*\n\n{}\n\nPlease try again.", reason)
            }
            Self::Expired => "⏰ Verification expired. Please try again.".to_string(),
            Self::Internal => "❌ Failed to process verification. Please try again.".to_string(),
        }
    }
}

/// Reply to the `/verify` command.
pub const VERIFY_PROMPT: &str = "🌱 *Verify Your Chia Wallet*\n\n\
     Tap the button below to connect your Sage Wallet and cryptographically prove ownership.\n\n\
     ✅ Secure signature via WalletConnect\n\
     ✅ No private keys shared\n\
     ✅ Instant verification";
