//! Relay runtime: start the chat connector, route each inbound message on its own task,
//! and stop cleanly on SIGINT/SIGTERM.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::assistant::CliAssistant;
use crate::channels::{ChannelRegistry, InboundMessage, TelegramChannel};
use crate::chunker::ReplyChunker;
use crate::config::{self, Config};
use crate::router::Router;

const INBOUND_QUEUE: usize = 64;

/// Build the router for a resolved config. Replies go through `channels`.
pub fn build_router(config: &Config, channels: Arc<ChannelRegistry>) -> Router {
    Router::new(
        channels,
        Arc::new(CliAssistant::from_config(config)),
        config.relay.allowed_senders.clone(),
        config.relay.working_directory.clone(),
        ReplyChunker::from_config(&config.relay),
    )
}

/// Receive inbound messages until the queue closes, spawning a task per message so
/// one sender's slow request does not hold up anyone else.
pub async fn dispatch(router: Arc<Router>, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
    while let Some(msg) = inbound_rx.recv().await {
        let router = router.clone();
        tokio::spawn(async move {
            let disposition = router.handle(msg).await;
            log::debug!("relay: message handled: {:?}", disposition);
        });
    }
}

/// Run the relay until shutdown. Fails when no bot token is configured, or when the
/// connector stops on its own (e.g. the token was revoked).
pub async fn run_relay(config: Config) -> Result<()> {
    let Some(token) = config::resolve_telegram_token(&config, &config::std_env) else {
        anyhow::bail!(
            "no telegram bot token configured (set channels.telegram.botToken or TELEGRAM_BOT_TOKEN)"
        );
    };
    if config.relay.allowed_senders.is_empty() {
        log::warn!("no allowed senders configured; every message will be rejected");
    } else {
        log::info!(
            "{} allowed sender(s) configured",
            config.relay.allowed_senders.len()
        );
    }
    let working_dir = &config.relay.working_directory;
    if !working_dir.is_dir() {
        log::warn!(
            "working directory {} does not exist; assistant runs will fail until it is created",
            working_dir.display()
        );
    }

    let channels = Arc::new(ChannelRegistry::new());
    let router = Arc::new(build_router(&config, channels.clone()));
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);

    let telegram = Arc::new(TelegramChannel::new(Some(token)));
    let poll_task = telegram.clone().start_inbound(inbound_tx);
    channels.register(telegram).await;
    log::info!(
        "relay running: {} via {} in {}",
        config.assistant.command,
        channels.ids().await.join(", "),
        working_dir.display()
    );

    let stopped_by_signal = tokio::select! {
        _ = dispatch(router, inbound_rx) => false,
        _ = shutdown_signal() => true,
    };

    channels.stop_all().await;
    poll_task.abort();
    let _ = poll_task.await;
    if stopped_by_signal {
        log::info!("relay stopped");
        Ok(())
    } else {
        anyhow::bail!("chat connector stopped; check the log (the bot token may have been revoked)")
    }
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channel connectors");
}
