mod commands;

use clap::{Parser, Subcommand};
use nimbus_cloud::TargetState;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Declarative OpenStack server reconciliation", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the cloud towards the spec document
    Apply {
        /// Spec document (default: discovered from the current directory)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Override the target state (present, absent)
        #[arg(long)]
        state: Option<TargetState>,
        /// Return as soon as create/delete has been requested
        #[arg(long)]
        no_wait: bool,
        /// Seconds to wait for create/delete to settle
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the spec document without contacting the cloud
    Validate {
        /// Spec document (default: discovered from the current directory)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show version
    Version,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("nimbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            file,
            state,
            no_wait,
            timeout,
            json,
        } => {
            commands::apply::handle(commands::apply::ApplyOptions {
                file,
                state,
                no_wait,
                timeout,
                json,
            })
            .await?;
        }
        Commands::Validate { file } => {
            commands::validate::handle(file)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
