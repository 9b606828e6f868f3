use clap::Subcommand;
use shroud_core::Program;
use shroud_utils::errors::ProgramError;
use std::error::Error;
use std::path::Path;

pub mod names;
pub mod obfuscate;
pub mod symbols;

#[derive(Subcommand)]
pub enum Cmd {
    /// Rewrite a program and write the result (optionally build it)
    Obfuscate(obfuscate::ObfuscateArgs),

    /// List declared symbols and how every identifier resolves
    Symbols(symbols::SymbolsArgs),

    /// Sample the name generator
    Names(names::NamesArgs),
}

pub trait Command {
    fn execute(self) -> Result<(), Box<dyn Error>>;
}

impl Command for Cmd {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Obfuscate(args) => args.execute(),
            Cmd::Symbols(args) => args.execute(),
            Cmd::Names(args) => args.execute(),
        }
    }
}

/// Loads a single `.cs` file or every `.cs` file under a directory.
pub(crate) fn load_program(input: &Path, name: Option<String>) -> Result<Program, ProgramError> {
    let stem = |p: &Path| {
        p.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Program")
            .to_string()
    };
    let name = name.unwrap_or_else(|| stem(input));
    if input.is_dir() {
        return Program::load_dir(name, input);
    }
    let text = std::fs::read_to_string(input).map_err(|source| ProgramError::FileRead {
        path: input.display().to_string(),
        source,
    })?;
    let file = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("Program.cs")
        .to_string();
    Program::from_sources(name, [(file, text)])
}
