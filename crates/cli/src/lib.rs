pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "lineup",
    about = "Lineup operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness and look up open slots.",
    after_help = "Examples:\n  lineup migrate\n  lineup doctor --json\n  \
                  lineup slots --provider 3 --date 2025-08-25"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, messenger readiness, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the free booking slots of a provider on one date")]
    Slots {
        #[arg(long = "provider", help = "Provider id")]
        provider_id: i64,
        #[arg(long, help = "Date as YYYY-MM-DD")]
        date: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Slots { provider_id, date } => commands::slots::run(provider_id, &date),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
