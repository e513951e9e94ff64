//! Inbound message routing: filter, authorize, answer built-in commands, and
//! forward everything else to the assistant one request per sender at a time.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assistant::Assistant;
use crate::channels::{ChannelRegistry, InboundMessage};
use crate::chunker::ReplyChunker;
use crate::session::SessionTracker;

pub const HELP_TEXT: &str = "🤖 Courier\n\n\
Send any message and it is passed to the assistant running on this machine.\n\n\
Commands:\n\
/help - show this message\n\
/status - show whether a request is running and the working directory\n\
/tasks - ask the assistant for the current task list";

/// Prompt sent in place of `/tasks`.
pub const TASKS_PROMPT: &str =
    "List the current tasks in this project with their status. Keep it brief.";

pub const PROCESSING_NOTICE: &str = "⏳ Processing...";
pub const BUSY_NOTICE: &str =
    "⏳ Still processing your previous request. Please wait for it to finish.";
pub const ERROR_PREFIX: &str = "❌ Error: ";

/// Built-in commands, matched case-insensitively against the whole trimmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Tasks,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim();
        if t.eq_ignore_ascii_case("/help") {
            Some(Self::Help)
        } else if t.eq_ignore_ascii_case("/status") {
            Some(Self::Status)
        } else if t.eq_ignore_ascii_case("/tasks") {
            Some(Self::Tasks)
        } else {
            None
        }
    }
}

/// What the router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Group, status broadcast, or no text body. Nothing sent.
    Ignored,
    /// Sender not on the allow-list. Nothing sent.
    Unauthorized,
    /// Answered a built-in command without invoking the assistant.
    Command(Command),
    /// Sender already has a request in flight; wait notice sent.
    Busy,
    /// Assistant invoked; `ok` is false when the invocation failed.
    Invoked { ok: bool },
}

/// Reduce a transport address to the identity used for authorization and sessions:
/// drop leading symbols (`+`, `@`, whitespace) and any `@network` suffix.
pub fn normalize_sender(raw: &str) -> String {
    let trimmed = raw.trim_start_matches(|c: char| !c.is_alphanumeric());
    let local = trimmed.split('@').next().unwrap_or_default();
    local.trim().to_string()
}

/// Routes inbound messages. Owns the per-sender session state.
pub struct Router {
    channels: Arc<ChannelRegistry>,
    assistant: Arc<dyn Assistant>,
    sessions: SessionTracker,
    allowed: HashSet<String>,
    working_dir: PathBuf,
    chunker: ReplyChunker,
}

impl Router {
    pub fn new(
        channels: Arc<ChannelRegistry>,
        assistant: Arc<dyn Assistant>,
        allowed: impl IntoIterator<Item = String>,
        working_dir: impl Into<PathBuf>,
        chunker: ReplyChunker,
    ) -> Self {
        let allowed: HashSet<String> = allowed
            .into_iter()
            .map(|s| normalize_sender(&s))
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            channels,
            assistant,
            sessions: SessionTracker::new(),
            allowed,
            working_dir: working_dir.into(),
            chunker,
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Fail-closed: an empty allow-list authorizes nobody.
    pub fn is_authorized(&self, sender: &str) -> bool {
        !self.allowed.is_empty() && self.allowed.contains(sender)
    }

    /// Handle one inbound message end to end, including all replies.
    pub async fn handle(&self, msg: InboundMessage) -> Disposition {
        if msg.is_group || msg.is_status {
            log::debug!(
                "router: ignoring {} message in {}",
                if msg.is_group { "group" } else { "status" },
                msg.conversation_id
            );
            return Disposition::Ignored;
        }
        let Some(body) = msg.body() else {
            log::debug!(
                "router: ignoring message without text from {} (media: {})",
                msg.sender,
                msg.has_media
            );
            return Disposition::Ignored;
        };

        let sender = normalize_sender(&msg.sender);
        if !self.is_authorized(&sender) {
            log::warn!(
                "router: rejected message from unauthorized sender {:?} on {}",
                sender,
                msg.channel_id
            );
            return Disposition::Unauthorized;
        }

        let prompt = match Command::parse(body) {
            Some(Command::Help) => {
                self.reply(&msg, HELP_TEXT).await;
                return Disposition::Command(Command::Help);
            }
            Some(Command::Status) => {
                self.reply(&msg, &self.status_text(&sender)).await;
                return Disposition::Command(Command::Status);
            }
            Some(Command::Tasks) => TASKS_PROMPT.to_string(),
            None => body.to_string(),
        };

        let Some(guard) = self.sessions.try_acquire(&sender) else {
            log::info!("router: {} is busy, not forwarding", sender);
            self.reply(&msg, BUSY_NOTICE).await;
            return Disposition::Busy;
        };

        self.reply(&msg, PROCESSING_NOTICE).await;
        let ok = match self.assistant.invoke(&prompt).await {
            Ok(output) => {
                self.reply_chunked(&msg, &output).await;
                true
            }
            Err(e) => {
                log::warn!("router: assistant failed for {}: {}", sender, e);
                self.reply(&msg, &format!("{}{}", ERROR_PREFIX, e)).await;
                false
            }
        };
        drop(guard);
        Disposition::Invoked { ok }
    }

    fn status_text(&self, sender: &str) -> String {
        let state = self.sessions.state(sender);
        let busy = match (state.busy, state.busy_since) {
            (true, Some(since)) => format!("Yes (since {} UTC)", since.format("%H:%M:%S")),
            (true, None) => "Yes".to_string(),
            (false, _) => "No".to_string(),
        };
        format!(
            "📊 Status\n\nBusy: {}\nWorking directory: {}",
            busy,
            self.working_dir.display()
        )
    }

    async fn reply(&self, msg: &InboundMessage, text: &str) {
        let Some(handle) = self.channels.get(&msg.channel_id).await else {
            log::warn!("router: no channel registered for {}", msg.channel_id);
            return;
        };
        if let Err(e) = handle.send_message(&msg.conversation_id, text).await {
            log::warn!("router: send to {} failed: {}", msg.conversation_id, e);
        }
    }

    async fn reply_chunked(&self, msg: &InboundMessage, text: &str) {
        let Some(handle) = self.channels.get(&msg.channel_id).await else {
            log::warn!("router: no channel registered for {}", msg.channel_id);
            return;
        };
        if let Err(e) = self
            .chunker
            .send(&*handle, &msg.conversation_id, text)
            .await
        {
            log::warn!("router: send to {} failed: {}", msg.conversation_id, e);
        }
    }
}
