use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use stanza_rs::StanzaError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod args;

use args::Cli;

const LOG_ENV: &str = "STANZA_LOG";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let code = error
                .downcast_ref::<StanzaError>()
                .map(StanzaError::code)
                .unwrap_or(1);
            println!(
                "{}",
                json!({
                    "failed": true,
                    "rc": code,
                    "msg": format!("{error:#}"),
                })
            );
            if code == stanza_rs::error::DESTINATION_MISSING_CODE {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn execute(cli: &Cli) -> Result<()> {
    let request = cli.to_request()?;
    debug!(path = %request.path.display(), stanza = request.stanza.as_str(), "request assembled");

    let report = stanza_rs::run(&request, cli.settings())?;

    if let Some(diff) = report.diff.as_ref().filter(|_| report.changed) {
        eprint!("{}", diff.unified());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
