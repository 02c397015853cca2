//! CLI frontend for the township economy simulation.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "township",
    about = "Township: a small market-town economy simulation",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a town and run it for a number of ticks
    Simulate {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "600")]
        ticks: u64,

        /// Simulated seconds per tick
        #[arg(long, default_value = "1.0")]
        dt: f64,

        /// RNG seed for deterministic runs (overrides the config file)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Simulation config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Blueprint catalog (JSON, default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Show every event, not just the notable ones
        #[arg(short, long)]
        verbose: bool,

        /// Print the final state as JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// List the commodities and blueprints in a catalog
    Catalog {
        /// Blueprint catalog (JSON, default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Write the built-in catalog to a file as a starting point
    InitCatalog {
        /// Output path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            ticks,
            dt,
            seed,
            config,
            catalog,
            verbose,
            json,
        } => commands::simulate::run(&commands::simulate::Options {
            ticks,
            dt,
            seed,
            config: config.as_deref(),
            catalog: catalog.as_deref(),
            verbose,
            json,
        }),
        Commands::Catalog { catalog } => commands::catalog::run(catalog.as_deref()),
        Commands::InitCatalog { path, force } => commands::init_catalog::run(&path, force),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
