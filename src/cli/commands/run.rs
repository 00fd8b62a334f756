// src/cli/commands/run.rs

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::core::{
    config::{CliOverrides, RunConfig},
    execution::TestRun,
    models::RunOutcome,
};
use crate::infra::docker::DockerRuntime;

pub async fn execute(config_path: PathBuf, overrides: CliOverrides) -> Result<ExitCode> {
    let config = RunConfig::load(&config_path, overrides)?;
    init_tracing(&config.log_level);

    println!(
        "Testing project: {}",
        config.project_dir.display().to_string().yellow()
    );
    println!("Gamemode: {} | Image: {}", config.gamemode.cyan(), config.image.cyan());

    let cancel = setup_cancellation(&config)?;

    let runtime = DockerRuntime::connect()
        .context("Failed to connect to the Docker daemon. Is it running?")?;

    let mut run = TestRun::new(runtime, config);
    let outcome = run.run(cancel).await.context("Test run failed")?;

    match &outcome {
        RunOutcome::Completed { exit_code: 0 } => {
            println!("\n{}", "All tests passed.".green().bold());
        }
        RunOutcome::Completed { exit_code } => {
            println!(
                "\n{} (exit code {})",
                "Test run failed.".red().bold(),
                exit_code
            );
        }
        RunOutcome::Killed => {
            println!("\n{}", "Test run was cancelled.".yellow().bold());
        }
    }

    Ok(ExitCode::from(outcome.exit_status()))
}

/// Diagnostics go to stderr so they interleave with the streamed server
/// log rather than corrupting anything a caller captures from stdout.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            format!("Unknown log level {log_level:?}, falling back to \"warn\"").yellow()
        );
        EnvFilter::new("warn")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One token, two triggers: Ctrl-C and the optional run deadline.
/// Whichever fires first cancels the run; the controller turns that into
/// a stop request against the running environment.
///
/// 一个令牌，两个触发源：Ctrl-C 和可选的运行截止时间。
/// 先触发者取消运行；控制器会将其转化为对运行中环境的停止请求。
fn setup_cancellation(config: &RunConfig) -> Result<CancellationToken> {
    let token = CancellationToken::new();

    let signal_token = token.clone();
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl-C");
        println!("\n{}", "Received Ctrl-C, stopping the test run...".yellow());
        signal_token.cancel();
    });

    if let Some(timeout) = config.timeout() {
        let deadline_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("Run deadline of {:?} reached, cancelling", timeout);
            deadline_token.cancel();
        });
    }

    Ok(token)
}
