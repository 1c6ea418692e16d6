//! CLI command implementations

pub mod categories;
pub mod classify;
pub mod patterns;
pub mod rerank;
pub mod status;
pub mod vendors;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use catwise_core::CatwiseContext;
use tokio_util::sync::CancellationToken;

/// Get the catwise directory from environment or default
pub fn get_catwise_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CATWISE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".catwise"))
}

/// Get or create catwise context
pub fn get_context() -> Result<CatwiseContext> {
    let catwise_dir = get_catwise_dir()?;

    std::fs::create_dir_all(&catwise_dir)
        .with_context(|| format!("Failed to create catwise directory: {:?}", catwise_dir))?;

    CatwiseContext::new(&catwise_dir).context("Failed to initialize catwise context")
}

/// Run an async command body to completion
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Cancellation token that fires on Ctrl-C
///
/// Must be called from inside the runtime.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing current merchant");
            on_signal.cancel();
        }
    });
    token
}
