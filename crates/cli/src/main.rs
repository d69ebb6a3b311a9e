//! uitrace CLI - Main Entry Point

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use uitrace_cli::commands::{cleanup, init, render, run};
use uitrace_cli::output::{self, print_error};

/// uitrace - browser login scenarios with step-level reports
#[derive(Parser)]
#[command(name = "uitrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (.json, .toml or .yaml)
    #[arg(short, long, default_value_os_t = uitrace_common::default_config_path(), global = true)]
    config: PathBuf,

    /// Output format for summaries
    #[arg(long, default_value = "table", global = true)]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured scenarios and write one report per engine
    Run(run::RunArgs),

    /// Delete old reports, screenshots and videos
    Cleanup(cleanup::CleanupArgs),

    /// Re-render a JSON report
    Render(render::RenderArgs),

    /// Write the default configuration file
    InitConfig(init::InitArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => match run::execute(args, &cli.config, cli.output).await {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                print_error(&format!("{:#}", e));
                std::process::exit(1);
            }
        },
        Commands::Cleanup(args) => cleanup::execute(args, &cli.config, cli.output).await?,
        Commands::Render(args) => {
            render::execute(args)?;
        }
        Commands::InitConfig(args) => init::execute(args, &cli.config)?,
        Commands::Version => {
            println!("uitrace v{}", uitrace_common::VERSION);
            println!("Browser login scenarios with step-level reports");
        }
    }

    Ok(())
}
