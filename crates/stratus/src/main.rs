mod commands;
mod driver;
mod handlers;
mod manifest;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Converge Alibaba Cloud DTS and RDS resources from a manifest", long_about = None)]
struct Cli {
    /// Credential profile from ~/.config/stratus/config.yaml
    #[arg(long, global = true, env = "STRATUS_PROFILE")]
    profile: Option<String>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update every resource in the manifest
    Apply {
        /// Manifest path (default: discovered from the current directory)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Re-read recorded resources and report drift
    Refresh {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Delete every recorded resource
    Destroy {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let profile = cli.profile.as_deref();
    match cli.command {
        Commands::Apply { file } => commands::apply::handle(file.as_deref(), profile).await,
        Commands::Refresh { file } => commands::refresh::handle(file.as_deref(), profile).await,
        Commands::Destroy { file } => commands::destroy::handle(file.as_deref(), profile).await,
        Commands::Version => {
            println!("stratus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
