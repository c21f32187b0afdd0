use anyhow::{Result, bail};
use clap::Parser;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3000/ws";
pub const DEFAULT_IDENTITY: &str = "michael";

/// Command line and environment settings for the chat client.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat", about = "Terminal client for a WebSocket chat server")]
pub struct ClientConfig {
    /// WebSocket endpoint of the chat server.
    #[arg(long, env = "CHAT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Name your messages are sent under.
    #[arg(long = "name", env = "CHAT_NAME", default_value = DEFAULT_IDENTITY)]
    pub identity: String,

    /// Log filter, e.g. `info` or `tokio_chat_client=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            identity: DEFAULT_IDENTITY.to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads `.env` if present, then parses the process arguments.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = ClientConfig::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.trim().is_empty() {
            bail!("name must not be empty");
        }
        if self.endpoint.trim().is_empty() {
            bail!("endpoint must not be empty");
        }
        Ok(())
    }
}
