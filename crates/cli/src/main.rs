use clap::{Parser, Subcommand};
use lib::assistant::{Assistant, CliAssistant};
use lib::chunker::ReplyChunker;
use lib::router::ERROR_PREFIX;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Relay chat messages to a local AI assistant CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config.json, and the assistant working directory.
    Init {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the relay: poll the chat channel and forward messages from allowed senders to the assistant.
    Run {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Send one prompt to the assistant and print the reply as it would be sent to chat.
    Ask {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Prompt text.
        prompt: String,
    },

    /// Print the resolved configuration (file plus environment overrides) as JSON.
    Config {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("courier {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_relay(config).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, prompt }) => {
            if let Err(e) = run_ask(config, prompt).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Config { config }) => {
            if let Err(e) = run_show_config(config) {
                log::error!("config failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let dir = lib::init::init_config_dir(&path, &config.relay.working_directory)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_relay(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::info!("loaded config from {}", path.display());
    lib::relay::run_relay(config).await
}

async fn run_ask(config_path: Option<PathBuf>, prompt: String) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let assistant = CliAssistant::from_config(&config);
    let chunker = ReplyChunker::from_config(&config.relay);
    log::info!("asking {} in {}", config.assistant.command, assistant.working_dir().display());
    match assistant.invoke(&prompt).await {
        Ok(output) => {
            for part in chunker.split(&output) {
                println!("{}\n", part);
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("{}{}", ERROR_PREFIX, e),
    }
}

fn run_show_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if config.channels.telegram.bot_token.is_some() {
        config.channels.telegram.bot_token = Some("<redacted>".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
