mod bot;
mod cleanup;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;

use walletproof_api::AppStateInner;
use walletproof_core::notifier::{LogNotifier, Notifier};
use walletproof_core::orchestrator::Orchestrator;
use walletproof_core::telegram::{TelegramClient, TelegramNotifier};
use walletproof_core::verifier::HttpVerifier;
use walletproof_db::Database;

use crate::config::Config;

/// How often the retention sweep runs.
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "walletproof=debug,walletproof_core=debug,walletproof_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Store
    let store = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);
    info!("Database opened at {}", config.db_path);

    // Collaborators
    let verifier = Arc::new(HttpVerifier::new(&config.verifier_url, config.policy.verify_timeout)?);
    let telegram = match &config.bot_token {
        Some(token) => Some(TelegramClient::new(token)?),
        None => None,
    };
    let notifier: Arc<dyn Notifier> = match &telegram {
        Some(client) => Arc::new(TelegramNotifier::new(client.clone())),
        None => {
            info!("TELEGRAM_BOT_TOKEN not set, outcome messages will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        verifier,
        notifier,
        config.policy,
    ));

    // Background tasks
    if let Some(retention) = config.retention {
        tokio::spawn(cleanup::run_cleanup_loop(store.clone(), retention, CLEANUP_INTERVAL_SECS));
    }
    if let (Some(client), true) = (telegram, config.bot_polling) {
        tokio::spawn(bot::run_bot_loop(client, orchestrator.clone(), config.webapp_url.clone()));
    }

    let app = walletproof_api::router(AppStateInner::new(store, orchestrator))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Wallet verification server listening on {}", addr);
    info!(
        "Freshness window {}s, verifier timeout {}s, retention {}",
        config.policy.max_age.as_secs(),
        config.policy.verify_timeout.as_secs(),
        config
            .retention
            .map(|r| format!("{}h", r.as_secs() / 3600))
            .unwrap_or_else(|| "disabled".into())
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
