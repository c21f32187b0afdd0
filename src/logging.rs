use anyhow::Result;

/// Installs the global subscriber. Logs go to stderr; stdout is the chat view.
#[cfg(not(feature = "console"))]
pub fn init(filter: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

/// Hands tracing over to tokio-console.
#[cfg(feature = "console")]
pub fn init(_filter: &str) -> Result<()> {
    console_subscriber::init();
    Ok(())
}
