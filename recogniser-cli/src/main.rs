//! # Recogniser - Headless Tuner Host
//!
//! Drives the pitch engine from a live microphone or a WAV file and prints
//! its event stream.
//!
//! ## Architecture
//! - **Main Thread**: command dispatch and event printing
//! - **Audio Thread**: CPAL callback feeding the engine's sample input
//! - **Analysis Thread**: owned by the engine
//! - **Communication**: Crossbeam channels for events and shutdown

mod commands;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recogniser")]
#[command(author, version, about = "Real-time pitch recogniser", long_about = None)]
struct Cli {
    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tune live from the default input device
    Listen(commands::listen::ListenArgs),

    /// Run a WAV file through the analyzer
    Analyze(commands::analyze::AnalyzeArgs),

    /// Show the nearest note to a frequency
    Note(commands::note::NoteArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        output::Format::Json
    } else {
        output::Format::Text
    };

    match cli.command {
        Commands::Listen(args) => commands::listen::run(args, format),
        Commands::Analyze(args) => commands::analyze::run(args, format),
        Commands::Note(args) => commands::note::run(args),
    }
}
