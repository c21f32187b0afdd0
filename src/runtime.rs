use anyhow::Result;
use tokio::runtime::Runtime;

/// Builds the single-threaded runtime the client runs on.
pub fn create_runtime() -> Result<Runtime> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .thread_name("tokio-chat-client")
        .enable_all()
        .build()?;
    Ok(runtime)
}
