/// Module for the `symbols` subcommand, which shows how a program's identifiers resolve.
///
/// Lists every declared symbol with the identity renaming would key it by, then counts how
/// each identifier occurrence binds (program symbol, namespace, type parameter, external or
/// unresolved). Unresolved occurrences are the ones renaming can only guess at.
use super::load_program;
use clap::Args;
use shroud_core::{Binding, Program, SymbolTable};
use shroud_transform::identity::SymbolIdentity;
use shroud_transform::Context;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

/// Arguments for the `symbols` subcommand.
#[derive(Args)]
pub struct SymbolsArgs {
    /// A `.cs` file or a directory of them.
    pub input: PathBuf,
    /// Also list every unresolved occurrence.
    #[arg(long)]
    pub unresolved: bool,
    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Occurrence counts per binding class.
fn binding_counts(ctx: &Context<'_>) -> (BTreeMap<&'static str, usize>, Vec<(String, usize, String)>) {
    let mut counts = BTreeMap::new();
    let mut unresolved = Vec::new();
    for (unit, source) in ctx.program.units().iter().enumerate() {
        let tree = source.tree();
        for token in 0..tree.tokens.len() {
            let Some(text) = tree.ident(token) else {
                continue;
            };
            let class = match ctx.binder.bind(unit, token) {
                Binding::Symbol(_) => "symbol",
                Binding::Namespace(_) => "namespace",
                Binding::TypeParameter => "type-parameter",
                Binding::External => "external",
                Binding::Unbound => {
                    unresolved.push((source.path().to_string(), tree.tokens[token].span.start, text.to_string()));
                    "unresolved"
                }
            };
            *counts.entry(class).or_insert(0) += 1;
        }
    }
    (counts, unresolved)
}

fn report(program: &Program, with_unresolved: bool) -> serde_json::Value {
    let symbols = SymbolTable::build(program);
    let ctx = Context::new(program, &symbols);
    let declared: Vec<serde_json::Value> = symbols
        .symbols()
        .iter()
        .filter(|s| s.id != symbols.root())
        .map(|s| {
            serde_json::json!({
                "kind": s.kind.label(),
                "display": s.display,
                "identity": SymbolIdentity::of_symbol(&symbols, s.id).key,
                "external": s.external,
                "declarations": s.origins.len(),
            })
        })
        .collect();
    let (counts, unresolved) = binding_counts(&ctx);
    let mut out = serde_json::json!({
        "program": program.name(),
        "symbols": declared,
        "bindings": counts,
    });
    if with_unresolved {
        out["unresolved"] = unresolved
            .into_iter()
            .map(|(path, offset, text)| serde_json::json!({ "path": path, "offset": offset, "text": text }))
            .collect();
    }
    out
}

/// Executes the `symbols` subcommand.
impl super::Command for SymbolsArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let program = load_program(&self.input, None)?;
        let report = report(&program, self.unresolved);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        for symbol in report["symbols"].as_array().into_iter().flatten() {
            println!(
                "{:<12} {:<48} {}",
                symbol["kind"].as_str().unwrap_or(""),
                symbol["display"].as_str().unwrap_or(""),
                symbol["identity"].as_str().unwrap_or("")
            );
        }
        println!();
        if let Some(bindings) = report["bindings"].as_object() {
            for (class, count) in bindings {
                println!("{class:<16} {count}");
            }
        }
        for entry in report["unresolved"].as_array().into_iter().flatten() {
            println!(
                "unresolved {}:{} {}",
                entry["path"].as_str().unwrap_or(""),
                entry["offset"],
                entry["text"].as_str().unwrap_or("")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_symbols_and_bindings() {
        let program = Program::from_sources(
            "App",
            [("a.cs", "class Widget { int Size; void Grow(int by) { Size += by; System.Console.WriteLine(by); } }")],
        )
        .unwrap();
        let report = report(&program, true);
        let displays: Vec<&str> = report["symbols"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["display"].as_str())
            .collect();
        assert!(displays.contains(&"Widget"));
        assert!(displays.contains(&"Widget.Grow"));
        assert!(report["bindings"]["symbol"].as_u64().unwrap() >= 5);
        assert!(report["unresolved"].is_array());
    }
}
