//! chaosli - author and rehearse disruptions without a cluster

use anyhow::Result;
use chaos_controller::config::ObservabilityConfig;
use chaos_controller::observability;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{simulate, validate};

/// Disruption authoring companion
#[derive(Parser)]
#[command(name = "chaosli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Enable verbose output and engine logs
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a disruption document
    #[command(alias = "v")]
    Validate(validate::ValidateArgs),

    /// Run a disruption against a simulated cluster
    #[command(alias = "sim")]
    Simulate(simulate::SimulateArgs),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    if cli.verbose {
        observability::init(&ObservabilityConfig {
            log_level: "debug".to_string(),
            ..ObservabilityConfig::default()
        })?;
    }

    let result = match cli.command {
        Commands::Validate(args) => validate::execute(args, cli.output),
        Commands::Simulate(args) => simulate::execute(args, cli.output).await,
        Commands::Completion { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(shell, &mut cmd, "chaosli", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        if cli.verbose {
            output::error(format!("{:?}", e));
        } else {
            output::error(e);
        }
        std::process::exit(1);
    }

    Ok(())
}
