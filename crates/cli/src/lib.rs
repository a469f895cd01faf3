pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "threadline",
    about = "Threadline operator CLI",
    long_about = "Prepare and inspect the Threadline WhatsApp ordering agent: database migrations, demo catalog, search index, config and readiness checks.",
    after_help = "Examples:\n  threadline migrate\n  threadline seed\n  threadline index --replace\n  threadline doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and report what the server would serve")]
    Start,
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo garment catalog (idempotent)")]
    Seed,
    #[command(about = "Embed catalog documents for product information search")]
    Index {
        #[arg(long, help = "Delete existing documents before indexing")]
        replace: bool,
        #[arg(long, value_name = "PATH", help = "Extra knowledge file, one document per paragraph")]
        source: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, credentials, database connectivity and catalog readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Index { replace, source } => commands::index::run(replace, source.as_deref()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
