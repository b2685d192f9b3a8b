use std::time::Duration;

use anyhow::{Context, Result};
use walletproof_core::orchestrator::Policy;
use walletproof_core::verifier::DEFAULT_VERIFIER_URL;

const DEFAULT_WEBAPP_URL: &str = "https://webapp-gold-sigma.vercel.app";

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub policy: Policy,
    pub verifier_url: String,
    /// How long snapshots are kept; `None` disables the retention sweep.
    pub retention: Option<Duration>,
    pub webapp_url: String,
    pub bot_token: Option<String>,
    pub bot_polling: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(v) => v.trim().parse().with_context(|| format!("{} must be a number, got {:?}", key, v)),
                None => Ok(default),
            }
        };

        let port = var("WALLETPROOF_PORT", "18790")
            .parse()
            .context("WALLETPROOF_PORT must be a port number")?;
        let bot_token = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty());
        let bot_polling = match lookup("WALLETPROOF_BOT_POLLING") {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
            None => bot_token.is_some(),
        };

        Ok(Self {
            host: var("WALLETPROOF_HOST", "127.0.0.1"),
            port,
            db_path: var("WALLETPROOF_DB_PATH", "walletproof.db"),
            policy: Policy {
                max_age: Duration::from_secs(number("WALLETPROOF_MAX_AGE_SECS", 300)?),
                verify_timeout: Duration::from_secs(number("WALLETPROOF_VERIFY_TIMEOUT_SECS", 10)?),
            },
            verifier_url: var("WALLETPROOF_VERIFIER_URL", DEFAULT_VERIFIER_URL),
            retention: retention(number("WALLETPROOF_RETENTION_HOURS", 720)?)?,
            webapp_url: var("WALLETPROOF_WEBAPP_URL", DEFAULT_WEBAPP_URL),
            bot_token,
            bot_polling,
        })
    }
}

fn retention(hours: u64) -> Result<Option<Duration>> {
    if hours == 0 {
        return Ok(None);
    }
    // Cutoffs are computed in i64 milliseconds.
    hours
        .checked_mul(3600 * 1000)
        .filter(|ms| i64::try_from(*ms).is_ok())
        .map(|ms| Some(Duration::from_millis(ms)))
        .with_context(|| format!("WALLETPROOF_RETENTION_HOURS is too large: {}", hours))
}
