// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::core::config::CliOverrides;

pub mod commands;

fn build_cli() -> Command {
    Command::new("gluatest-runner")
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs GLuaTest suites for a Garry's Mod addon project inside an isolated Docker container")
        .subcommand(
            Command::new("run")
                .about("Run the project's test suite and exit with its status")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Path to the runner configuration file")
                        .value_name("CONFIG")
                        .default_value("gluatest.toml")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .help("Addon project to test (overrides the config file)")
                        .value_name("PROJECT_DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("gamemode")
                        .long("gamemode")
                        .help("Gamemode the test server boots into")
                        .value_name("GAMEMODE")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("collection")
                        .long("collection")
                        .help("Workshop collection id to mount on startup")
                        .value_name("COLLECTION_ID")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout-secs")
                        .long("timeout-secs")
                        .help("Abort the run after this many seconds (0 disables the deadline)")
                        .value_name("TIMEOUT_SECS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("max-age-secs")
                        .long("max-age-secs")
                        .help("Recreate containers older than this many seconds instead of reusing them")
                        .value_name("MAX_AGE_SECS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("no-filter")
                        .long("no-filter")
                        .help("Stream the raw server log instead of just the test window")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("loglevel")
                        .long("loglevel")
                        .help("Runner diagnostics verbosity (error, warn, info, debug, trace)")
                        .value_name("LEVEL")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("init")
                .about("Create a starter gluatest.toml for the current project")
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help("Write a default config file without launching the interactive prompts.")
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub async fn run() -> Result<ExitCode> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let config = run_matches
                .get_one::<PathBuf>("config")
                .unwrap() // Has default
                .clone();

            let overrides = CliOverrides {
                project_dir: run_matches.get_one::<PathBuf>("project-dir").cloned(),
                gamemode: run_matches.get_one::<String>("gamemode").cloned(),
                collection_id: run_matches.get_one::<String>("collection").cloned(),
                timeout_secs: run_matches.get_one::<u64>("timeout-secs").copied(),
                max_container_age_secs: run_matches.get_one::<u64>("max-age-secs").copied(),
                no_filter: run_matches.get_flag("no-filter"),
                log_level: run_matches.get_one::<String>("loglevel").cloned(),
            };

            commands::run::execute(config, overrides).await
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            commands::init::run_init_wizard(non_interactive)?;
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            // This case handles when no subcommand is given.
            // Clap will have already printed help info.
            Ok(ExitCode::SUCCESS)
        }
    }
}
