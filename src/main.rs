use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookcrawl::logging::init().context("init logging")?;

    let cli = bookcrawl::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        bookcrawl::cli::Command::Crawl(args) => {
            bookcrawl::crawl::run(args).await.context("crawl")?;
        }
        bookcrawl::cli::Command::Query(args) => {
            bookcrawl::query::run(args).context("query")?;
        }
    }

    Ok(())
}
