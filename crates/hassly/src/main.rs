mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hassly_api::Connection;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "hassly", &mut std::io::stdout());
            Ok(())
        }

        // Everything else talks to the server
        cmd => {
            let connection_config = config::build_connection_config(&cli.global)?;
            let conn = Connection::open(connection_config)?;

            let ready = tokio::time::timeout(
                Duration::from_secs(cli.global.timeout),
                conn.wait_ready(),
            )
            .await;

            let result = match ready {
                Ok(Ok(())) => {
                    tracing::debug!(command = ?cmd, "dispatching command");
                    commands::dispatch(cmd, &conn, &cli.global).await
                }
                Ok(Err(e)) => Err(CliError::from(e)),
                Err(_) => Err(CliError::Timeout {
                    seconds: cli.global.timeout,
                }),
            };

            conn.close().await;
            result
        }
    }
}
