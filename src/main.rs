use anyhow::Result;
use clap::Parser;
use storm_rs::{cli, launch};

/// 初始化日志，RUST_LOG 优先于 --verbose
fn init_tracing(verbose: bool) {
    let fallback_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let config = args.into_config()?;
    init_tracing(config.verbose);

    launch(&config).await
}
