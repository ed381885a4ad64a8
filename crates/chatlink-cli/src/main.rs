//! ChatLink terminal client.
//!
//! A thin consumer of `chatlink-transport-client`: stdin lines become chat
//! messages, inbound text is printed using the `[sender]: content`
//! convention, and `upload` pushes one file with a progress readout.
//!
//! Logging goes to stderr; use `RUST_LOG=debug` for transport details.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatlink_core::ClientConfig;

mod chat;
mod upload;

#[derive(Parser, Debug)]
#[command(name = "chatlink", version, about = "Chat and file upload client")]
struct Cli {
    /// JSON config file; missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join the chat; each stdin line is sent as a message.
    Chat(ServerArgs),
    /// Upload one file.
    Upload {
        #[command(flatten)]
        server: ServerArgs,
        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ServerArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long)]
    pub port: u16,
    #[arg(long)]
    pub user: String,
}

impl ServerArgs {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("--host must not be empty");
        }
        if self.port == 0 {
            bail!("--port must be between 1 and 65535");
        }
        let len = self.user.trim().chars().count();
        if !(2..=20).contains(&len) {
            bail!("--user must be 2 to 20 characters");
        }
        Ok(())
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ClientConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("ChatLink client v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config(cli.config.as_ref())?;

    let outcome = match cli.command {
        Command::Chat(server) => {
            server.validate()?;
            chat::run(config, server).await
        }
        Command::Upload { server, file } => {
            server.validate()?;
            upload::run(config, server, file).await
        }
    };

    match outcome {
        Ok(()) => {
            info!("ChatLink client exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
