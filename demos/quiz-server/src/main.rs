//! Standalone quiz server.
//!
//! Loads every `*.json` quiz under `data/` (or `LEARNLOOP_QUIZ_DIR`),
//! verifies credentials as signed tokens, and serves WebSocket clients.
//!
//! ```text
//! LEARNLOOP_ADDR=:8080 LEARNLOOP_DEV=1 cargo run -p quiz-server
//! ```

use learnloop::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let quiz_dir = std::env::var("LEARNLOOP_QUIZ_DIR").unwrap_or_else(|_| "data".into());
    let catalog = MemoryCatalog::load_dir(&quiz_dir).await?;
    tracing::info!(dir = %quiz_dir, quizzes = catalog.len(), "quiz catalog loaded");

    let auth = JwtAuthenticator::new(config.key_cache());
    let server = LearnLoopServerBuilder::new()
        .config(config)
        .catalog(catalog)
        .build(auth)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "quiz server listening");
    server.run().await?;
    Ok(())
}
