/// Module for measuring how much of a C# program an obfuscation run has hidden.
///
/// Counts the surface an analyst reads first (string literals, foreign-function
/// imports, namespace names and declared identifiers) before and after a run,
/// and reports how many declared names no longer appear verbatim anywhere in
/// the rewritten program.
///
/// # Usage
/// ```rust,ignore
/// let before = metrics::collect_metrics(&program)?;
/// // ... run the pipeline over `program` ...
/// let after = metrics::collect_metrics(&program)?;
/// let report = metrics::compare(&before, &after);
/// println!("{}", serde_json::to_string_pretty(&report)?);
/// ```
use serde::{Deserialize, Serialize};
use shroud_core::lexer::{TokenKind, string_value};
use shroud_core::{Program, SyntaxTree};
use shroud_utils::errors::MetricsError;
use std::collections::BTreeSet;

const IMPORT_ATTRIBUTES: &[&str] = &["DllImport", "DllImportAttribute"];

/// Surface counts of one program snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramMetrics {
    /// Number of source files.
    pub units: usize,
    /// Total source size in bytes.
    pub bytes: usize,
    /// String literals whose value can be read off the source.
    pub string_literals: usize,
    /// Methods still carrying a foreign-function import attribute.
    pub foreign_imports: usize,
    /// Distinct declared namespace names.
    pub namespaces: usize,
    /// Distinct names of declared types, members, parameters and locals.
    pub declared_identifiers: usize,
    #[serde(skip)]
    declared: BTreeSet<String>,
    #[serde(skip)]
    spelled: BTreeSet<String>,
}

impl ProgramMetrics {
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }
}

/// Before/after comparison of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub before: ProgramMetrics,
    pub after: ProgramMetrics,
    /// Fraction of originally declared names absent from the output.
    pub identifier_coverage: f64,
    /// Originally declared names still spelled somewhere in the output.
    pub surviving_identifiers: Vec<String>,
    pub size_increase_percentage: f64,
}

fn declared_names(tree: &SyntaxTree, out: &mut BTreeSet<String>) {
    let names = tree
        .types
        .iter()
        .map(|t| t.name.as_str())
        .chain(tree.members.iter().map(|m| m.name.as_str()))
        .chain(tree.params.iter().map(|p| p.name.as_str()))
        .chain(tree.locals.iter().map(|l| l.name.as_str()));
    out.extend(
        names
            .filter(|n| !n.is_empty() && !n.starts_with('.'))
            .map(str::to_string),
    );
}

fn foreign_imports(tree: &SyntaxTree) -> usize {
    tree.members
        .iter()
        .filter(|m| {
            m.attributes.iter().any(|&list| {
                tree.attributes[list]
                    .attributes
                    .iter()
                    .any(|a| IMPORT_ATTRIBUTES.contains(&a.name.simple_name()))
            })
        })
        .count()
}

fn string_literals(tree: &SyntaxTree) -> usize {
    tree.tokens
        .iter()
        .filter(|t| matches!(t.kind, TokenKind::String { .. }) && string_value(&tree.text, t).is_some())
        .count()
}

/// Collects surface counts for every unit of `program`.
///
/// # Returns
/// The counts, or an error if the program has no units.
pub fn collect_metrics(program: &Program) -> Result<ProgramMetrics, MetricsError> {
    if program.is_empty() {
        return Err(MetricsError::EmptyProgram);
    }

    let mut metrics = ProgramMetrics {
        units: program.len(),
        spelled: program.identifiers(),
        ..ProgramMetrics::default()
    };
    let mut namespaces = BTreeSet::new();
    for unit in program.units() {
        let tree = unit.tree();
        metrics.bytes += unit.text().len();
        metrics.string_literals += string_literals(tree);
        metrics.foreign_imports += foreign_imports(tree);
        namespaces.extend(tree.namespaces.iter().map(|n| n.full_name.clone()));
        declared_names(tree, &mut metrics.declared);
    }
    metrics.namespaces = namespaces.len();
    metrics.declared_identifiers = metrics.declared.len();

    tracing::debug!(
        "Collected metrics: {} unit(s), {} literal(s), {} import(s), {} identifier(s)",
        metrics.units,
        metrics.string_literals,
        metrics.foreign_imports,
        metrics.declared_identifiers
    );
    Ok(metrics)
}

/// Compares snapshots taken before and after a run.
///
/// A declared name counts as hidden when no identifier token of the output
/// spells it.
pub fn compare(before: &ProgramMetrics, after: &ProgramMetrics) -> CoverageReport {
    let surviving: Vec<String> = before
        .declared
        .iter()
        .filter(|name| after.spelled.contains(*name))
        .cloned()
        .collect();
    let identifier_coverage = if before.declared.is_empty() {
        1.0
    } else {
        1.0 - surviving.len() as f64 / before.declared.len() as f64
    };
    let size_increase_percentage = if before.bytes == 0 {
        0.0
    } else {
        (after.bytes as f64 - before.bytes as f64) / before.bytes as f64 * 100.0
    };
    CoverageReport {
        before: before.clone(),
        after: after.clone(),
        identifier_coverage,
        surviving_identifiers: surviving,
        size_increase_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = r#"using System.Runtime.InteropServices;
namespace Demo.App
{
    class Widget
    {
        [DllImport("user32.dll")]
        static extern int MessageBeep(uint kind);

        string Greet(string who)
        {
            var text = "hello " + who;
            return text;
        }
    }
}
"#;

    #[test]
    fn counts_surface() {
        let program = Program::from_sources("App", [("a.cs", SRC)]).unwrap();
        let metrics = collect_metrics(&program).unwrap();
        assert_eq!(metrics.units, 1);
        assert_eq!(metrics.string_literals, 2);
        assert_eq!(metrics.foreign_imports, 1);
        assert_eq!(metrics.namespaces, 1);
        for name in ["Widget", "MessageBeep", "kind", "Greet", "who", "text"] {
            assert!(metrics.declared().contains(name), "{name}");
        }
        assert_eq!(metrics.declared_identifiers, 6);
    }

    #[test]
    fn coverage_counts_vanished_names() {
        let before = collect_metrics(&Program::from_sources("App", [("a.cs", SRC)]).unwrap()).unwrap();
        let renamed = SRC.replace("Widget", "QWERTY").replace("Greet", "ASDFG");
        let after = collect_metrics(&Program::from_sources("App", [("a.cs", renamed.as_str())]).unwrap()).unwrap();
        let report = compare(&before, &after);
        assert!((report.identifier_coverage - 2.0 / 6.0).abs() < 1e-9);
        assert!(!report.surviving_identifiers.contains(&"Widget".to_string()));
        assert!(report.surviving_identifiers.contains(&"who".to_string()));
        assert!(report.size_increase_percentage.abs() < 1e-9);
    }

    #[test]
    fn empty_program_is_an_error() {
        assert!(matches!(
            collect_metrics(&Program::new("App")),
            Err(MetricsError::EmptyProgram)
        ));
    }

    #[test]
    fn report_serializes() {
        let metrics = collect_metrics(&Program::from_sources("App", [("a.cs", SRC)]).unwrap()).unwrap();
        let json = serde_json::to_value(compare(&metrics, &metrics)).unwrap();
        assert_eq!(json["identifier_coverage"], 0.0);
        assert!(json["before"].get("declared").is_none());
    }
}
