pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "parsergen",
    about = "Agent-driven bank-statement parser generator",
    long_about = "Generate, sandbox-test, and persist bank-statement PDF parsers \
                  through a bounded generate/test/refine loop.",
    after_help = "Examples:\n  parsergen generate icici\n  parsergen doctor --json\n  parsergen config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the generate/test/refine loop for one target bank")]
    Generate {
        #[arg(help = "Target identifier, e.g. `icici`")]
        target: String,
        #[arg(long, help = "Path to a parsergen.toml config file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Override the sample/ground-truth data directory")]
        data_dir: Option<PathBuf>,
        #[arg(long, help = "Override the output directory for accepted parsers")]
        parser_dir: Option<PathBuf>,
        #[arg(long, help = "Override the attempt bound")]
        max_attempts: Option<u32>,
    },
    #[command(about = "Validate config, oracle credential, container runtime, and data layout")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate { target, config, data_dir, parser_dir, max_attempts } => {
            commands::generate::run(&target, commands::generate::Options {
                config_path: config,
                data_dir,
                parser_dir,
                max_attempts,
            })
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
