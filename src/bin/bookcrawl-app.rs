use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

const DATASET_ENV: &str = "BOOKCRAWL_DATASET";
const DEFAULT_DATASET: &str = "data/books.json";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Dataset written by `bookcrawl crawl` (default: $BOOKCRAWL_DATASET or data/books.json).
    #[arg(long)]
    dataset: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookcrawl::logging::init_with_default(bookcrawl::logging::APP_DIRECTIVES)?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting bookcrawl-app");

    let dataset_path = args.dataset.clone().unwrap_or_else(|| {
        std::env::var(DATASET_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATASET), PathBuf::from)
    });

    let catalog = bookcrawl::dataset::load_catalog(&dataset_path).context("load dataset")?;
    let app = bookcrawl::app::router(Arc::new(catalog));

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, dataset = %dataset_path.display(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
