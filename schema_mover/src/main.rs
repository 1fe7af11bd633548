//! schema_mover CLI
//!
//! Reconciles one or more configured target databases with their SQL schema files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use schema_mover::config::{self, DEFAULT_CONFIG_FILE};
use schema_mover::utils::logging::init_logging;
use schema_mover::{run_targets, Command, CommandOutput, TargetOutcome};

/// Keep live databases in line with a declarative SQL schema.
#[derive(Parser)]
#[command(name = "schema_mover")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML).
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the targets in line with their schema.
    Migrate {
        /// Names of configured targets.
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Print the statements a migration would run, without running them.
    Propose {
        /// Names of configured targets.
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Check that the targets are reachable and their schema parses.
    Test {
        /// Names of configured targets.
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

impl Commands {
    fn split(self) -> (Command, Vec<String>) {
        match self {
            Commands::Migrate { targets } => (Command::Migrate, targets),
            Commands::Propose { targets } => (Command::Propose, targets),
            Commands::Test { targets } => (Command::Test, targets),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let mut logging = config.logging.clone().unwrap_or_default();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    init_logging(&Some(logging)).context("Failed to initialise logging")?;

    let (command, targets) = cli.command.split();
    let outcomes = run_targets(&config, &targets, command).await;

    let mut failed = false;
    for outcome in &outcomes {
        failed |= !outcome.is_success();
        report(outcome);
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn report(outcome: &TargetOutcome) {
    match &outcome.result {
        Ok(CommandOutput::Proposed(plan)) => {
            println!("-- {}", outcome.target);
            print!("{}", plan.render());
        }
        Ok(CommandOutput::Tested(phases)) => {
            let counts: Vec<String> = phases
                .iter()
                .map(|(phase, count)| format!("{} {}", phase, count))
                .collect();
            println!("{}: ok ({})", outcome.target, counts.join(", "));
        }
        Ok(CommandOutput::Migrated(report)) => {
            println!(
                "{}: {} operations executed in {} ms",
                outcome.target,
                report.executed,
                report.duration().num_milliseconds()
            );
            if let Some(summary) = report.summary() {
                eprintln!("{}: {}", outcome.target, summary);
            }
        }
        Err(e) => eprintln!("{}: {}", outcome.target, e),
    }
}
