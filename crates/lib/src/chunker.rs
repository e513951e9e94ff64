//! Split long replies into labelled parts that fit the channel's message size.

use std::time::Duration;

use crate::channels::ChannelHandle;
use crate::config::RelayConfig;

/// Splits replies on line boundaries and sends the parts with a pause between them.
#[derive(Debug, Clone)]
pub struct ReplyChunker {
    limit: usize,
    delay: Duration,
}

impl ReplyChunker {
    pub fn new(limit: usize, delay: Duration) -> Self {
        Self { limit, delay }
    }

    pub fn from_config(relay: &RelayConfig) -> Self {
        Self::new(relay.chunk_limit, relay.chunk_delay())
    }

    /// Messages to send for `text`, in order.
    pub fn split(&self, text: &str) -> Vec<String> {
        split_reply(text, self.limit)
    }

    /// Send `text` to a conversation, split if needed. A failed part is logged and the
    /// remaining parts are still sent. Returns the number of messages sent, or the
    /// first failure.
    pub async fn send(
        &self,
        channel: &dyn ChannelHandle,
        conversation_id: &str,
        text: &str,
    ) -> Result<usize, String> {
        let parts = self.split(text);
        let total = parts.len();
        let mut first_err = None;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            if let Err(e) = channel.send_message(conversation_id, part).await {
                log::warn!(
                    "part {}/{} to {} failed: {}",
                    i + 1,
                    total,
                    conversation_id,
                    e
                );
                first_err.get_or_insert(format!("part {}/{}: {}", i + 1, total, e));
            }
        }
        if total > 1 {
            log::debug!("sent reply to {} in {} parts", conversation_id, total);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}

/// Split `text` into messages of at most `limit` characters of body.
///
/// Text within the limit is returned verbatim. Longer text is cut between lines
/// (each line keeps its newline) and every piece is prefixed with `Part <n>:`.
/// A single line longer than the limit is never cut and becomes its own part.
pub fn split_reply(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut bodies = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if buf_len > 0 && buf_len + line_len > limit {
            bodies.push(std::mem::take(&mut buf));
            buf_len = 0;
        }
        buf.push_str(line);
        buf_len += line_len;
    }
    if !buf.is_empty() {
        bodies.push(buf);
    }

    if bodies.len() == 1 {
        return bodies;
    }
    bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| format!("{}{}", part_label(i + 1), body))
        .collect()
}

/// Prefix for the `n`th part (1-indexed).
pub fn part_label(n: usize) -> String {
    format!("Part {}:\n\n", n)
}
