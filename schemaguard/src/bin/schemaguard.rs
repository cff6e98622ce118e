//! CLI for schemaguard: check a request document against a rule file.
//!
//! Exit status: 0 valid, 1 invalid, 2 configuration or IO error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use schemaguard::{check, init_tracing, load_request, CliError, FailureMode, Rules};

#[derive(Parser, Debug)]
#[command(name = "schemaguard", version, about = "Validate request properties against JSON Schema")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a request document and print the response body.
    Check {
        /// Rule file: {"schemas": {...}, "dependencies": [...]}
        #[arg(long)]
        rules: PathBuf,
        /// Request document; each top-level key is a request property (body, query, params, ...)
        #[arg(long)]
        request: PathBuf,
        /// Raw query string, replaces the document's "query"
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value = "POST")]
        method: String,
        #[arg(long, default_value = "/")]
        path: String,
        /// How a validation failure travels down the chain: raise or proceed
        #[arg(long, default_value_t = FailureMode::Raise)]
        mode: FailureMode,
        /// Print single-line JSON
        #[arg(long)]
        compact: bool,
    },
}

fn run(command: Commands) -> Result<bool, CliError> {
    match command {
        Commands::Check {
            rules,
            request,
            query,
            method,
            path,
            mode,
            compact,
        } => {
            let rules = Rules::load(&rules)?;
            let request = load_request(&request, &method, &path, query.as_deref())?;
            let outcome = check(&rules, &request, mode)?;
            let rendered = if compact {
                serde_json::to_string(&outcome.body)
            } else {
                serde_json::to_string_pretty(&outcome.body)
            }
            .map_err(schemaguard::CoreError::from)?;
            println!("{rendered}");
            Ok(outcome.valid)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("schemaguard: {e}");
            ExitCode::from(2)
        }
    }
}
