// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use foreman::config::Config;

#[derive(Parser)]
#[command(
    name = "foreman",
    version,
    about = "Orchestrator for assistant coding sessions in terminal multiplexer panes."
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Server lifecycle.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
}

#[derive(clap::Subcommand)]
enum ServerAction {
    /// Start the server; exits 0 on clean shutdown.
    Start,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { action: ServerAction::Start } => {
            if let Err(e) = cli.config.validate() {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
            if let Err(e) = foreman::run::run(cli.config).await {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
