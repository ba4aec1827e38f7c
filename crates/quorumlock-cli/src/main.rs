//! Entry point for the `quorumlock` command.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use quorumlock_cli::{
    command,
    model::{Cli, Configuration},
    startup,
};
use quorumlock_core::LockManager;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    quorumlock_core::metrics::describe_metrics();

    let pool = Arc::new(startup::build_pool(&configuration.pool_config()?)?);
    let manager = Arc::new(LockManager::new(pool, configuration.lock_config()?)?);
    let shutdown = startup::shutdown_token();

    let output = command::run(cli.command, manager, shutdown).await?;
    println!("{}", serde_json::to_string_pretty(&output.report)?);

    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
