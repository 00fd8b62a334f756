use gluatest_runner::cli;
use std::process::ExitCode;

/// Exit status reserved for "could not run the tests at all" so that
/// automation can tell infrastructure failures apart from test failures.
const EXIT_INFRA_FAILURE: u8 = 125;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_INFRA_FAILURE)
        }
    }
}
