//! Scriptblock CLI
//!
//! Inspect native signature encodings: parse them, show their C layout,
//! check that a trampoline can be built, and print runtime settings.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use output::{resolve_color_choice, StyledOutput};

#[derive(Parser)]
#[command(name = "scriptblock")]
#[command(about = "Signature encoding inspector for script-to-native bridges", long_about = None)]
#[command(version)]
struct Cli {
    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    /// Enable debug logging (overrides SCRIPTBLOCK_LOG)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an encoding and describe its types
    Parse {
        /// Type encoding, e.g. "i@:i"
        encoding: String,
        /// Print the parsed signature as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show native sizes, alignments and struct field offsets
    Layout {
        /// Type encoding
        encoding: String,
    },

    /// Check that trampolines can be built for each encoding
    Check {
        /// Type encodings
        #[arg(required = true)]
        encodings: Vec<String>,
    },

    /// Show version, limits and environment settings
    Info,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.verbose {
        0 => scriptblock_core::init_logging(),
        1 => scriptblock_core::logging::init_logging_with("scriptblock=debug"),
        _ => scriptblock_core::logging::init_logging_with("scriptblock=trace"),
    }

    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    match cli.command {
        Commands::Parse { encoding, json } => commands::parse::execute(&mut out, &encoding, json),
        Commands::Layout { encoding } => commands::layout::execute(&mut out, &encoding),
        Commands::Check { encodings } => commands::check::execute(&mut out, &encodings),
        Commands::Info => commands::info::execute(&mut out),
    }
}
