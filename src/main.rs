use anyhow::Result;
use tokio::io::BufReader;
use tokio_chat_client::runtime::create_runtime;
use tokio_chat_client::{ChatSession, ClientConfig, TerminalView, logging};
use tracing::info;

fn main() -> Result<()> {
    let config = ClientConfig::load()?;
    logging::init(&config.log_filter)?;

    let runtime = create_runtime()?;
    runtime.block_on(async {
        info!("Connecting to {} as {}", config.endpoint, config.identity);
        let view = TerminalView::stdout(config.identity.clone());
        let session = ChatSession::connect(&config, view)?;
        session.run(BufReader::new(tokio::io::stdin())).await?;
        Ok::<(), anyhow::Error>(())
    })
}
