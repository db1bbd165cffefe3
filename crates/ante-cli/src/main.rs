mod cmd;
mod config;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ante",
    about = "Turn engine for an automated Balatro player: serve the game bridge, inspect runs and notes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file (default: ./ante.yaml)
    #[arg(long, global = true, env = "ANTE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server the game talks to
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List runs, newest first
    Runs,

    /// Show every stored turn of a run
    History { run: String },

    /// List the latest note for every object
    Notes {
        /// Only this kind (joker, consumable, voucher, tag, boss_blind)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show one object's note
    Note {
        kind: String,
        name: String,
        /// Show every version, newest first
        #[arg(long)]
        history: bool,
    },

    /// Rewind a run to a turn and restore the save captured there
    Continue { run: String, turn: u64 },

    /// Delete a run with all its turns and snapshots
    Purge { run: String },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config_path = config::resolve_path(cli.config.as_deref());
    let result = config::load(&config_path).and_then(|config| match cli.command {
        Commands::Serve { port } => cmd::serve::run(config, port),
        Commands::Runs => cmd::runs::list(&config, cli.json),
        Commands::History { run } => cmd::runs::history(&config, &run, cli.json),
        Commands::Notes { kind } => cmd::notes::list(&config, kind.as_deref(), cli.json),
        Commands::Note {
            kind,
            name,
            history,
        } => cmd::notes::show(&config, &kind, &name, history, cli.json),
        Commands::Continue { run, turn } => cmd::resume::run(&config, &run, turn, cli.json),
        Commands::Purge { run } => cmd::purge::run(&config, &run, cli.json),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
