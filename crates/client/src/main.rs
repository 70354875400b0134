// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use serata::config::ClientConfig;

/// Headless Serata client: logs in, connects the realtime channel, and
/// tails presence and chat events.
#[derive(Debug, Parser)]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    /// Login username.
    #[arg(long, env = "SERATA_USERNAME")]
    username: String,

    /// Login password.
    #[arg(long, env = "SERATA_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = serata::run(cli.config, &cli.username, &cli.password).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
