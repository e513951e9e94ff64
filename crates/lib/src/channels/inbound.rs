//! Inbound message from a channel: delivered to the relay for authorization and routing.

/// A message from a channel, already flattened from the transport's event shape.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub channel_id: String,
    /// Reply destination (e.g. Telegram chat_id).
    pub conversation_id: String,
    /// Raw sender address as the transport reports it; normalized by the router.
    pub sender: String,
    /// Text body. None for media-only or service messages.
    pub text: Option<String>,
    pub is_group: bool,
    /// Status/broadcast feed rather than a direct conversation.
    pub is_status: bool,
    pub has_media: bool,
}

impl InboundMessage {
    /// Direct text message; convenience for connectors and tests.
    pub fn direct(
        channel_id: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let sender = sender.into();
        Self {
            channel_id: channel_id.into(),
            conversation_id: sender.clone(),
            sender,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Text body with surrounding whitespace removed; None when absent or blank.
    pub fn body(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
