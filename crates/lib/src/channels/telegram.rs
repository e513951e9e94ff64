//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const RETRY_DELAY_SECS: u64 = 2;

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    /// Posts in broadcast channels the bot belongs to.
    #[serde(default)]
    pub channel_post: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<serde_json::Value>,
    #[serde(default)]
    pub document: Option<serde_json::Value>,
    #[serde(default)]
    pub voice: Option<serde_json::Value>,
    #[serde(default)]
    pub video: Option<serde_json::Value>,
    #[serde(default)]
    pub audio: Option<serde_json::Value>,
    #[serde(default)]
    pub sticker: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    /// "private", "group", "supergroup" or "channel".
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

impl TelegramMessage {
    fn has_media(&self) -> bool {
        self.photo.is_some()
            || self.document.is_some()
            || self.voice.is_some()
            || self.video.is_some()
            || self.audio.is_some()
            || self.sticker.is_some()
    }
}

impl TelegramUpdate {
    /// Flatten an update into an inbound message for channel `channel_id`. None when the update carries no message.
    pub fn into_inbound(self, channel_id: &str) -> Option<InboundMessage> {
        let (msg, from_broadcast) = match (self.message, self.channel_post) {
            (Some(m), _) => (m, false),
            (None, Some(p)) => (p, true),
            (None, None) => return None,
        };
        let chat_id = msg.chat.id.to_string();
        let sender = msg
            .from
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| chat_id.clone());
        let has_media = msg.has_media();
        Some(InboundMessage {
            channel_id: channel_id.to_string(),
            conversation_id: chat_id,
            sender,
            is_group: matches!(msg.chat.kind.as_str(), "group" | "supergroup"),
            is_status: from_broadcast || msg.chat.kind == "channel",
            has_media,
            text: msg.text,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum PollError {
    /// Token revoked or invalid; polling cannot recover without a new token.
    #[error("telegram rejected the bot token (401 Unauthorized)")]
    Unauthorized,
    #[error("{0}")]
    Other(String),
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: telegram_api_base(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the getUpdates long-poll loop and forward messages to the relay. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), PollError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| PollError::Other("telegram bot token not configured".to_string()))?;
        let mut url = format!(
            "{}/bot{}/getUpdates?timeout={}",
            self.api_base, token, LONG_POLL_TIMEOUT
        );
        if let Some(off) = offset {
            url = format!("{}&offset={}", url, off);
        }
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PollError::Other(e.to_string()))?;
        if res.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PollError::Unauthorized);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PollError::Other(format!("getUpdates failed: {} {}", status, body)));
        }
        let data: GetUpdatesResponse = res
            .json()
            .await
            .map_err(|e| PollError::Other(e.to_string()))?;
        if !data.ok {
            return Err(PollError::Other("getUpdates returned ok: false".to_string()));
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    /// Send a text message to a chat via sendMessage API.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sendMessage failed: {} {}", status, body));
        }
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next.or(offset);
                for u in updates {
                    let Some(inbound) = u.into_inbound(&channel.id) else {
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(PollError::Unauthorized) => {
                log::error!(
                    "telegram channel logged out: bot token rejected; set a new TELEGRAM_BOT_TOKEN and restart"
                );
                channel.running.store(false, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(RETRY_DELAY_SECS)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        TelegramChannel::send_message(self, conversation_id, text).await
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}
