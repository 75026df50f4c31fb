//! # ds - table inspection and load tool
//!
//! Command-line companion for engine table files.
//!
//! ## Commands
//!
//! ```text
//! ds stats <path> [-j|--json]            Print counts and schema of a table file
//! ds stress [-w DIR] [-t THREADS] [-n COUNT]
//!                                        Hammer a scratch table from many threads
//! ds -h | --help                         Print usage
//! ```
//!
//! ## Configuration
//!
//! Logging goes to stderr and is filtered with `RUST_LOG` (default: `warn`).
//! The stress command also reads its defaults from the environment:
//!
//! ```text
//! DS_STRESS_WORK_DIR  Directory for the scratch table   (default: temp dir)
//! DS_STRESS_THREADS   Worker threads                    (default: 4)
//! DS_STRESS_COUNT     Operations across all threads     (default: 10000)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ ds stats users.db
//! Total entries: 3
//! Total indexes: 6
//! Total unique indexes: 3
//! Name: User
//! Primary key field: username
//! Indexed fields: [group, enabled]
//! Unique fields: [email]
//! Last insert index: 3
//! Store size: 1581056
//! ```

mod stats;
mod stress;

use anyhow::{bail, Result};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: ds <command> [options]

Commands:
  stats <path> [-j|--json]           Print counts and schema of a table file
  stress [-w DIR] [-t THREADS] [-n COUNT]
                                     Run a concurrent load against a scratch table

Options:
  -h, --help                         Print this help
";

/// Reads a configuration value from the environment, falling back to `default`.
pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &[String]) -> Result<()> {
    let Some((command, rest)) = args.split_first() else {
        bail!("missing command\n\n{USAGE}");
    };

    match command.as_str() {
        "stats" => stats::run(rest),
        "stress" => stress::run(rest),
        "-h" | "--help" | "help" => {
            print!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }
}

fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
