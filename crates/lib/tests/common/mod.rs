//! Shared fakes for router and relay tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lib::channels::{ChannelHandle, ChannelRegistry, InboundMessage};
use lib::chunker::ReplyChunker;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHANNEL: &str = "test";
pub const ALICE: &str = "+15551234567";
pub const ALICE_ID: &str = "15551234567";

/// Channel that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to one conversation, in order.
    pub fn texts_to(&self, conversation_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == conversation_id)
            .map(|(_, t)| t)
            .collect()
    }
}

#[async_trait]
impl ChannelHandle for RecordingChannel {
    fn id(&self) -> &str {
        CHANNEL
    }

    fn stop(&self) {}

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub async fn registry_with(channel: Arc<RecordingChannel>) -> Arc<ChannelRegistry> {
    let registry = Arc::new(ChannelRegistry::new());
    registry.register(channel).await;
    registry
}

/// Direct message from `sender` on the test channel; replies go back to `sender`.
pub fn direct(sender: &str, text: &str) -> InboundMessage {
    InboundMessage::direct(CHANNEL, sender, text)
}

pub fn fast_chunker() -> ReplyChunker {
    ReplyChunker::new(4000, Duration::ZERO)
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}
