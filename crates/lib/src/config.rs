//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.courier/config.json`) and environment.
//! Environment values, when non-empty, override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::router::normalize_sender;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Relay behaviour: who may talk to the assistant and how replies are sent.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Assistant CLI invocation.
    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Sender identities allowed to use the relay. Empty rejects everyone.
    /// With the Telegram connector these are numeric user ids (`from.id`), not
    /// `@usernames`. Overridden by COURIER_ALLOWED_SENDERS (comma-separated).
    #[serde(default)]
    pub allowed_senders: Vec<String>,

    /// Directory the assistant runs in. Overridden by COURIER_WORKDIR.
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Replies longer than this many characters are split into parts.
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,

    /// Pause between consecutive parts of a split reply.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// Program to run (default "claude"). Overridden by COURIER_ASSISTANT_CMD.
    #[serde(default = "default_assistant_command")]
    pub command: String,

    /// Arguments placed before the fixed flags and the prompt.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Hard wall-clock limit for one invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_working_directory() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_chunk_limit() -> usize {
    4000
}

fn default_chunk_delay_ms() -> u64 {
    500
}

fn default_assistant_command() -> String {
    "claude".to_string()
}

fn default_max_turns() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            allowed_senders: Vec::new(),
            working_directory: default_working_directory(),
            chunk_limit: default_chunk_limit(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: default_assistant_command(),
            args: Vec::new(),
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RelayConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Environment lookup used by the resolvers; `std_env` in production, a map in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Process environment.
pub fn std_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Trimmed, non-empty value of an environment variable.
fn env_nonempty(env: EnvLookup<'_>, key: &str) -> Option<String> {
    env(key).and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config, env: EnvLookup<'_>) -> Option<String> {
    env_nonempty(env, "TELEGRAM_BOT_TOKEN").or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Split a comma-separated allow-list into normalized identities, dropping empty entries.
pub fn parse_sender_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_sender)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolve the allow-list: env COURIER_ALLOWED_SENDERS overrides config. Entries are normalized.
pub fn resolve_allowed_senders(config: &Config, env: EnvLookup<'_>) -> Vec<String> {
    match env_nonempty(env, "COURIER_ALLOWED_SENDERS") {
        Some(raw) => parse_sender_list(&raw),
        None => config
            .relay
            .allowed_senders
            .iter()
            .map(|s| normalize_sender(s))
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// Resolve the assistant working directory: env COURIER_WORKDIR overrides config.
pub fn resolve_working_dir(config: &Config, env: EnvLookup<'_>) -> PathBuf {
    env_nonempty(env, "COURIER_WORKDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.relay.working_directory.clone())
}

/// Apply environment overrides in place so the rest of the program reads a single resolved config.
pub fn apply_env_overrides(config: &mut Config, env: EnvLookup<'_>) {
    config.channels.telegram.bot_token = resolve_telegram_token(config, env);
    config.relay.allowed_senders = resolve_allowed_senders(config, env);
    config.relay.working_directory = resolve_working_dir(config, env);
    if let Some(cmd) = env_nonempty(env, "COURIER_ASSISTANT_CMD") {
        config.assistant.command = cmd;
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("COURIER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".courier").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Environment overrides are applied. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = read_config_file(&path)?;
    apply_env_overrides(&mut config, &std_env);
    Ok((config, path))
}

fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_contract() {
        let config = Config::default();
        assert!(config.relay.allowed_senders.is_empty());
        assert_eq!(config.relay.working_directory, PathBuf::from("./workspace"));
        assert_eq!(config.relay.chunk_limit, 4000);
        assert_eq!(config.relay.chunk_delay(), Duration::from_millis(500));
        assert_eq!(config.assistant.command, "claude");
        assert_eq!(config.assistant.max_turns, 3);
        assert_eq!(config.assistant.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn empty_json_object_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.relay.chunk_limit, 4000);
        assert_eq!(config.assistant.command, "claude");
    }

    #[test]
    fn camel_case_keys_parse() {
        let json = r#"{
            "channels": { "telegram": { "botToken": "abc" } },
            "relay": { "allowedSenders": ["+15551234567"], "workingDirectory": "/srv/repo", "chunkLimit": 100 },
            "assistant": { "command": "sh", "args": ["-c", "echo hi"], "maxTurns": 5, "timeoutSecs": 10 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.channels.telegram.bot_token.as_deref(), Some("abc"));
        assert_eq!(config.relay.allowed_senders, vec!["+15551234567"]);
        assert_eq!(config.relay.working_directory, PathBuf::from("/srv/repo"));
        assert_eq!(config.relay.chunk_limit, 100);
        assert_eq!(config.relay.chunk_delay_ms, 500);
        assert_eq!(config.assistant.args, vec!["-c", "echo hi"]);
        assert_eq!(config.assistant.max_turns, 5);
        assert_eq!(config.assistant.timeout_secs, 10);
    }

    #[test]
    fn sender_list_is_trimmed_and_normalized() {
        assert_eq!(
            parse_sender_list(" +15551234567 , 987654321,,  15550001111@s.whatsapp.net ,"),
            vec!["15551234567", "987654321", "15550001111"]
        );
    }

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    fn file_config() -> Config {
        let mut config = Config::default();
        config.channels.telegram.bot_token = Some(" file-token ".to_string());
        config.relay.allowed_senders = vec!["+15550001111".to_string()];
        config.relay.working_directory = PathBuf::from("/srv/file");
        config
    }

    #[test]
    fn env_values_override_file() {
        let env = env_of(&[
            ("TELEGRAM_BOT_TOKEN", "env-token"),
            ("COURIER_ALLOWED_SENDERS", "111, +222"),
            ("COURIER_WORKDIR", "/srv/env"),
            ("COURIER_ASSISTANT_CMD", "my-assistant"),
        ]);
        let mut config = file_config();
        apply_env_overrides(&mut config, &env);
        assert_eq!(config.channels.telegram.bot_token.as_deref(), Some("env-token"));
        assert_eq!(config.relay.allowed_senders, vec!["111", "222"]);
        assert_eq!(config.relay.working_directory, PathBuf::from("/srv/env"));
        assert_eq!(config.assistant.command, "my-assistant");
    }

    #[test]
    fn blank_env_values_fall_back_to_file() {
        let env = env_of(&[
            ("TELEGRAM_BOT_TOKEN", "  "),
            ("COURIER_ALLOWED_SENDERS", ""),
            ("COURIER_WORKDIR", " "),
            ("COURIER_ASSISTANT_CMD", ""),
        ]);
        let mut config = file_config();
        apply_env_overrides(&mut config, &env);
        assert_eq!(config.channels.telegram.bot_token.as_deref(), Some("file-token"));
        assert_eq!(config.relay.allowed_senders, vec!["15550001111"]);
        assert_eq!(config.relay.working_directory, PathBuf::from("/srv/file"));
        assert_eq!(config.assistant.command, "claude");
    }

    #[test]
    fn unset_env_uses_file_and_defaults() {
        let env = env_of(&[]);
        let config = file_config();
        assert_eq!(resolve_telegram_token(&config, &env).as_deref(), Some("file-token"));
        assert_eq!(resolve_allowed_senders(&config, &env), vec!["15550001111"]);
        assert_eq!(resolve_working_dir(&config, &env), PathBuf::from("/srv/file"));
        assert_eq!(resolve_working_dir(&Config::default(), &env), PathBuf::from("./workspace"));
    }

    #[test]
    fn blank_file_token_resolves_to_none() {
        let mut config = Config::default();
        config.channels.telegram.bot_token = Some("   ".to_string());
        assert_eq!(resolve_telegram_token(&config, &env_of(&[])), None);
    }

    #[test]
    fn sender_list_of_separators_is_empty() {
        assert!(parse_sender_list(" , ,+ ,").is_empty());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir()
            .join(format!("courier-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let config = read_config_file(&path).unwrap();
        assert_eq!(config.relay.chunk_limit, 4000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("courier-bad-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_config_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
    }
}
