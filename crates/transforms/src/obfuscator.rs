use crate::carrier::{Carrier, WavCarrier};
use crate::emit::{BuildOptions, EmitOutcome, Emitter};
use crate::foreign_call::ForeignCallRewriter;
use crate::generator::{GeneratorConfig, NameGenerator};
use crate::inject::{inject, HelperRole};
use crate::namespace::NamespaceCollapser;
use crate::pass::{ConflictPolicy, DefaultPass, Pass, PassReport};
use crate::rename::{IdentifierRenamer, RenameConfig};
use crate::resources::ResourceBundle;
use crate::session::{Diagnostics, InjectedHelper, Session};
use crate::stego::{StegoRewriter, DEFAULT_THRESHOLD};
use crate::strings::StringEncryptor;
use crate::type_reference::{TargetType, TypeReferenceRewriter};
use crate::{RewriteKind, Rewriter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use shroud_analysis::metrics::{self, CoverageReport};
use shroud_core::Program;
use shroud_utils::errors::ObfuscateError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration for the obfuscation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationConfig {
    /// Random seed for deterministic obfuscation. Drawn fresh when unset.
    pub seed: Option<u64>,
    /// Program name used when loading sources from a directory
    pub program_name: Option<String>,
    /// Passes to run. Always executed in pipeline order.
    pub passes: Vec<RewriteKind>,
    pub generator: GeneratorConfig,
    pub rename: RenameConfig,
    pub conflict_policy: ConflictPolicy,
    /// External types hidden by type-reference indirection
    pub target_types: Vec<TargetType>,
    /// Literals longer than this are hidden in resources
    pub stego_threshold: usize,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            program_name: None,
            passes: RewriteKind::ALL.to_vec(),
            generator: GeneratorConfig::default(),
            rename: RenameConfig::default(),
            conflict_policy: ConflictPolicy::Skip,
            target_types: vec![TargetType::default()],
            stego_threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ObfuscationConfig {
    /// Every pass.
    pub fn default_obfuscation(seed: Option<u64>) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Strings, namespaces and identifiers only.
    pub fn light_obfuscation(seed: Option<u64>) -> Self {
        Self {
            seed,
            passes: vec![
                RewriteKind::StringEncryption,
                RewriteKind::NamespaceCollapse,
                RewriteKind::IdentifierRenaming,
            ],
            ..Self::default()
        }
    }

    pub fn identifiers_only(seed: Option<u64>) -> Self {
        Self {
            seed,
            passes: vec![RewriteKind::IdentifierRenaming],
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ObfuscateError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Result of the obfuscation pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ObfuscationResult {
    /// Per-pass outcome of every unit
    pub passes: Vec<PassReport>,
    pub coverage: CoverageReport,
    pub diagnostics: Diagnostics,
    pub metadata: ObfuscationMetadata,
    /// Hidden payloads, for packaging at emission
    #[serde(skip)]
    pub resources: ResourceBundle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationMetadata {
    /// Passes that ran, in order
    pub passes_applied: Vec<RewriteKind>,
    /// Seed used for the obfuscation
    pub seed_used: u64,
    /// The namespace every user namespace collapsed into
    pub namespace: String,
    pub helpers: Vec<InjectedHelper>,
    /// `(resource name, keccak-256 of the container)`
    pub payloads: Vec<(String, String)>,
}

/// Runs the configured passes over a program.
#[derive(Debug, Clone, Default)]
pub struct Obfuscator {
    config: ObfuscationConfig,
}

impl Obfuscator {
    pub fn new(config: ObfuscationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ObfuscationConfig {
        &self.config
    }

    /// Loads every `.cs` file under `dir` as one program.
    pub fn load_program(&self, dir: &Path) -> Result<Program, ObfuscateError> {
        let name = self.config.program_name.clone().unwrap_or_else(|| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("Program")
                .to_string()
        });
        Ok(Program::load_dir(name, dir)?)
    }

    /// The configured passes, deduplicated and in pipeline order.
    pub fn pipeline(&self) -> Vec<RewriteKind> {
        let mut passes = self.config.passes.clone();
        passes.sort();
        passes.dedup();
        if passes != self.config.passes {
            warn!(
                "Passes reordered to pipeline order: {}",
                passes.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
            );
        }
        passes
    }

    fn rewriter(&self, kind: RewriteKind) -> Box<dyn Rewriter> {
        match kind {
            RewriteKind::ForeignCall => Box::new(ForeignCallRewriter::new()),
            RewriteKind::TypeReference => Box::new(TypeReferenceRewriter::new(self.config.target_types.clone())),
            RewriteKind::Steganography => Box::new(StegoRewriter::new(self.config.stego_threshold, Box::new(WavCarrier))),
            RewriteKind::StringEncryption => Box::new(StringEncryptor::new()),
            RewriteKind::NamespaceCollapse => Box::new(NamespaceCollapser::new()),
            RewriteKind::IdentifierRenaming => Box::new(IdentifierRenamer::new(self.config.rename.clone())),
        }
    }

    /// Rewrites `program` in place.
    pub fn run(&self, program: &mut Program) -> Result<ObfuscationResult, ObfuscateError> {
        let passes = self.pipeline();
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let generator = NameGenerator::new(self.config.generator.clone(), StdRng::seed_from_u64(seed))?;
        let mut session = Session::for_program(program, generator)?;

        let before = metrics::collect_metrics(program)?;
        info!(
            "Obfuscating {} ({} unit(s)) with seed 0x{:x}",
            program.name(),
            program.len(),
            seed
        );
        debug!("  Passes: {:?}", passes);
        debug!("  Namespace: {}", session.namespace());

        let pass = DefaultPass {
            policy: self.config.conflict_policy,
        };
        let mut reports = Vec::with_capacity(passes.len());
        for kind in &passes {
            let rewriter = self.rewriter(*kind);
            reports.push(pass.run(program, rewriter.as_ref(), &mut session)?);
        }

        let resources = ResourceBundle::from_payloads(session.payloads(), WavCarrier.extension())?;
        if !resources.is_empty() {
            inject(program, HelperRole::ResourceAccessors, &mut session, None)?;
        }

        let after = metrics::collect_metrics(program)?;
        let coverage = metrics::compare(&before, &after);
        info!(
            "Done: {:.1}% of declared identifiers hidden, {} conflict(s), {} resource(s)",
            coverage.identifier_coverage * 100.0,
            session.diagnostics().conflicts.len(),
            resources.entries().len()
        );

        let metadata = ObfuscationMetadata {
            passes_applied: passes,
            seed_used: seed,
            namespace: session.namespace().to_string(),
            helpers: session.injected().cloned().collect(),
            payloads: session
                .payloads()
                .iter()
                .map(|p| (p.name.clone(), p.digest()))
                .collect(),
        };
        Ok(ObfuscationResult {
            passes: reports,
            coverage,
            diagnostics: session.diagnostics().clone(),
            metadata,
            resources,
        })
    }

    /// Rewrites `program` and builds it.
    pub fn run_and_emit(
        &self,
        program: &mut Program,
        emitter: &dyn Emitter,
        options: &BuildOptions,
    ) -> Result<(ObfuscationResult, EmitOutcome), ObfuscateError> {
        let result = self.run(program)?;
        let outcome = emitter.emit(program, &result.resources, options)?;
        Ok((result, outcome))
    }
}

/// Print a human-readable summary of a run.
pub fn print_obfuscation_analysis(result: &ObfuscationResult) {
    let coverage = &result.coverage;
    println!("Obfuscation summary (seed 0x{:x})", result.metadata.seed_used);
    for report in &result.passes {
        println!(
            "  {:<20} {:>4} unit(s) {:>6} edit(s) {:>3} skipped",
            report.kind.name(),
            report.rewritten(),
            report.edits(),
            report.skipped()
        );
    }
    println!(
        "  string literals      {} -> {}",
        coverage.before.string_literals, coverage.after.string_literals
    );
    println!(
        "  foreign imports      {} -> {}",
        coverage.before.foreign_imports, coverage.after.foreign_imports
    );
    println!(
        "  namespaces           {} -> {}",
        coverage.before.namespaces, coverage.after.namespaces
    );
    println!(
        "  identifiers hidden   {:.1}% ({} surviving)",
        coverage.identifier_coverage * 100.0,
        coverage.surviving_identifiers.len()
    );
    println!(
        "  resolution           {} exact, {} heuristic, {} unknown",
        result.diagnostics.exact, result.diagnostics.heuristic, result.diagnostics.unknown
    );
    println!("  size change          {:+.1}%", coverage.size_increase_percentage);
}
