pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use premia_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::ask::AskArgs;
use crate::commands::quote::QuoteArgs;

#[derive(Debug, Parser)]
#[command(
    name = "premia",
    about = "Premia operator CLI",
    long_about = "Price insurance products from their rate tables, ask the assistant questions, and inspect readiness.",
    after_help = "Examples:\n  premia quote --product \"Activ Assure\" --age 35 --sum-insured 5L\n  premia ask \"Compare ActivAssure and ActivFit for a 40 year old\"\n  premia doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to premia.toml (defaults to ./premia.toml or ./config/premia.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Compute a premium quote from the registered rate tables")]
    Quote(QuoteArgs),
    #[command(about = "Run a question through the reasoning loop and print the outcome")]
    Ask(AskArgs),
    #[command(about = "List products with rate tables and with document collections")]
    Products,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM endpoint, rate tables and document collections")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(options: &LoadOptions) {
    use tracing::Level;

    let Ok(config) = AppConfig::load(options.clone()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() };
    init_logging(&options);

    let result = match cli.command {
        Command::Quote(args) => commands::quote::run(options, &args),
        Command::Ask(args) => commands::ask::run(options, &args),
        Command::Products => commands::products::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(options, json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
