/// Module for the `obfuscate` subcommand, which rewrites a C# program.
///
/// This module loads a source file or directory, runs the selected passes in pipeline order,
/// writes the rewritten sources (and any hidden resources) to an output directory, and
/// optionally writes a JSON report and builds the result.
use super::load_program;
use clap::Args;
use shroud_transform::emit::{write_sources, BuildOptions, Emitter, Optimization, Platform, ProjectEmitter};
use shroud_transform::obfuscator::{print_obfuscation_analysis, ObfuscationConfig, Obfuscator};
use shroud_transform::pass::ConflictPolicy;
use shroud_transform::RewriteKind;
use shroud_utils::errors::ObfuscateError;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Arguments for the `obfuscate` subcommand.
#[derive(Args)]
pub struct ObfuscateArgs {
    /// A `.cs` file or a directory of them.
    pub input: PathBuf,
    /// Directory the rewritten sources are written to.
    #[arg(short, long, default_value = "obfuscated")]
    pub output: PathBuf,
    /// JSON configuration file. Absent fields take defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Preset used when no configuration file is given.
    #[arg(long, default_value = "default", value_parser = ["default", "light", "identifiers"])]
    pub preset: String,
    /// Comma-separated passes, overriding the preset (e.g. strings,namespaces,rename).
    #[arg(long)]
    pub passes: Option<String>,
    /// Random seed for reproducible output.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Program name. Defaults to the input's file stem.
    #[arg(long)]
    pub name: Option<String>,
    /// Fail instead of skipping a file whose edits overlap.
    #[arg(long)]
    pub abort_on_conflict: bool,
    /// Path to write the run report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Build the rewritten program into this directory.
    #[arg(long)]
    pub emit: Option<PathBuf>,
    /// Target platform for --emit (x86, x64, anycpu).
    #[arg(long, default_value = "x64")]
    pub platform: Platform,
    /// Optimization level for --emit (debug, release).
    #[arg(long, default_value = "release")]
    pub optimization: Optimization,
    /// Build command for --emit.
    #[arg(long, default_value = "dotnet")]
    pub build_command: String,
}

impl ObfuscateArgs {
    fn config(&self) -> Result<ObfuscationConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ObfuscationConfig::from_json(&fs::read_to_string(path)?)?,
            None => match self.preset.as_str() {
                "light" => ObfuscationConfig::light_obfuscation(None),
                "identifiers" => ObfuscationConfig::identifiers_only(None),
                _ => ObfuscationConfig::default_obfuscation(None),
            },
        };
        if let Some(list) = &self.passes {
            config.passes = parse_passes(list)?;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.name.is_some() {
            config.program_name = self.name.clone();
        }
        if self.abort_on_conflict {
            config.conflict_policy = ConflictPolicy::Abort;
        }
        Ok(config)
    }
}

/// Builds the pass list from a comma-separated string.
fn parse_passes(list: &str) -> Result<Vec<RewriteKind>, ObfuscateError> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|name| name.parse().map_err(|_| ObfuscateError::InvalidPass(name.trim().to_string())))
        .collect()
}

/// Executes the `obfuscate` subcommand.
impl super::Command for ObfuscateArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let config = self.config()?;
        let mut program = load_program(&self.input, config.program_name.clone())?;
        let obfuscator = Obfuscator::new(config);
        let result = obfuscator.run(&mut program)?;

        let written = write_sources(&program, &self.output)?;
        result.resources.write_to(&self.output)?;
        println!("Wrote {} file(s) to {}", written.len(), self.output.display());

        if let Some(path) = &self.report {
            fs::write(path, serde_json::to_string_pretty(&result)?)?;
            println!("Wrote report to {}", path.display());
        }

        print_obfuscation_analysis(&result);

        if let Some(out) = self.emit {
            let options = BuildOptions {
                platform: self.platform,
                optimization: self.optimization,
                output: out,
                command: self.build_command,
                ..BuildOptions::default()
            };
            let outcome = ProjectEmitter::new().emit(&program, &result.resources, &options)?;
            println!("Built {} into {}", program.name(), outcome.output.display());
        }
        Ok(())
    }
}
