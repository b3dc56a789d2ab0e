use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use evlog_cli::commands;
use evlog_cli::config::{Cli, EvlogConfig};
use evlog_logging::{EvlogSubscriberBuilder, JobContextGuard};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = EvlogConfig::load(&cli)?;

    let _log_guard = EvlogSubscriberBuilder::new()
        .with_config(config.logging.clone())
        .init();
    let _job = JobContextGuard::new(config.archive.job.as_str(), config.archive.machine.as_str());
    let span = tracing::info_span!(
        "evlog",
        job = %config.archive.job,
        machine = %config.archive.machine
    );
    let _entered = span.enter();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let status = commands::run(cli.command, &config, &mut out)?;
    out.flush()?;
    Ok(ExitCode::from(status))
}
