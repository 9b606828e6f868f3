/// Entry point for the Shroud CLI, a C# source obfuscation tool.
///
/// This module parses command-line arguments and dispatches to subcommands for rewriting a
/// program, inspecting how its identifiers resolve, or sampling the name generator. It
/// initializes logging and handles the main execution flow.
use clap::Parser;
use shroud_cli::commands::{Cmd, Command};
use tracing_subscriber::EnvFilter;

/// Command-line interface for Shroud.
///
/// Shroud rewrites a C# program at the source level: foreign-call and type-reference
/// indirection, steganographic literal hiding, string encryption, namespace collapse and
/// identifier renaming.
#[derive(Parser)]
#[command(name = "shroud")]
#[command(about = "Shroud: C# source obfuscator")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the Shroud CLI with the provided arguments.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.execute()
}
