//! Communication channels (e.g. Telegram).
//!
//! Channel trait and registry so the relay can start/stop channel connectors
//! and send replies. Inbound messages are pushed to the relay for routing.

mod inbound;
mod registry;
mod telegram;

pub use inbound::InboundMessage;
pub use registry::{ChannelHandle, ChannelRegistry};
pub use telegram::{TelegramChannel, TelegramUpdate};
