use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lingua_core::agents::{LlmClient, ProviderStore};
use lingua_core::api::{router, ApiState};

#[derive(Parser, Debug)]
#[command(name = "lingua-server", about = "HTTP front for LLM-backed language tasks")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "LINGUA_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Settings document, relative to the working directory unless absolute
    #[arg(long, env = "LINGUA_SETTINGS", default_value = "data/llm-config.json")]
    settings: PathBuf,

    /// Transport timeout for provider calls, in seconds
    #[arg(long, env = "LINGUA_HTTP_TIMEOUT", default_value_t = 45)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let store = ProviderStore::json_file(&args.settings);
    let client = LlmClient::with_timeout(Duration::from_secs(args.timeout_secs))?;
    let app = router(ApiState::new(store, client));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    log::info!(
        "listening on {} (settings: {})",
        args.bind,
        args.settings.display()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}
