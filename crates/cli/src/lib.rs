pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "rolodex",
    about = "Rolodex operator CLI",
    long_about = "Operate Rolodex migrations, customer exports and runtime readiness checks.",
    after_help = "Examples:\n  rolodex migrate\n  rolodex export --output customers.csv\n  rolodex doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Dump all customer rows as sanitized delimited text")]
    Export {
        #[arg(long, help = "Write the CSV to this path instead of stdout")]
        output: Option<PathBuf>,
    },
    #[command(about = "Validate config and database connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Export { output } => commands::export::run(output.as_deref()),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
