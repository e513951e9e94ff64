//! Courier core library: chat channels, message router, assistant invoker,
//! and reply chunking used by the `courier` CLI.

pub mod assistant;
pub mod channels;
pub mod chunker;
pub mod config;
pub mod init;
pub mod relay;
pub mod router;
pub mod session;
