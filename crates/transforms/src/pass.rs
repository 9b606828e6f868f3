use crate::inject::{inject, HelperRole};
use crate::session::{ConflictRecord, Session};
use crate::{Context, RewriteKind, Rewriter};
use serde::{Deserialize, Serialize};
use shroud_core::{apply_edits, EditConflict, Program, ProgramUnit, SymbolTable};
use shroud_utils::errors::RewriteError;
use tracing::{info, warn};

/// What to do with a unit whose edit set cannot be applied cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Leave the unit as it was and record the conflict.
    #[default]
    Skip,
    /// Fail the whole run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum UnitOutcome {
    Unchanged,
    Rewritten { edits: usize, helper: Option<HelperRole> },
    Conflicted { conflict: EditConflict },
    /// The edited text no longer parsed.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub kind: RewriteKind,
    pub outcomes: Vec<(String, UnitOutcome)>,
    pub injected: Vec<HelperRole>,
}

impl PassReport {
    fn new(kind: RewriteKind) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
            injected: Vec::new(),
        }
    }

    pub fn rewritten(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, UnitOutcome::Rewritten { .. }))
            .count()
    }

    pub fn edits(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                UnitOutcome::Rewritten { edits, .. } => *edits,
                _ => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, UnitOutcome::Conflicted { .. } | UnitOutcome::Rejected { .. }))
            .count()
    }
}

/// Runs one rewriter over a whole program.
pub trait Pass {
    fn run(
        &self,
        program: &mut Program,
        rewriter: &dyn Rewriter,
        session: &mut Session,
    ) -> Result<PassReport, RewriteError>;
}

/// Plans against a fresh symbol table, applies each unit's edit set in one
/// step, re-parses the result, then injects the helpers the rewritten units
/// asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPass {
    pub policy: ConflictPolicy,
}

impl Pass for DefaultPass {
    fn run(
        &self,
        program: &mut Program,
        rewriter: &dyn Rewriter,
        session: &mut Session,
    ) -> Result<PassReport, RewriteError> {
        let kind = rewriter.kind();
        let plans = {
            let symbols = SymbolTable::build(program);
            let ctx = Context::new(program, &symbols);
            rewriter.plan_program(&ctx, session)?
        };

        let mut report = PassReport::new(kind);
        let mut requested: Vec<(HelperRole, usize)> = Vec::new();
        for plan in plans {
            let Some(unit) = program.unit(plan.unit) else {
                continue;
            };
            let path = unit.path().to_string();
            if plan.is_empty() {
                report.outcomes.push((path, UnitOutcome::Unchanged));
                continue;
            }

            let text = match apply_edits(unit.text(), &plan.edits) {
                Ok(text) => text,
                Err(conflict) => {
                    if self.policy == ConflictPolicy::Abort {
                        return Err(RewriteError::Conflict {
                            path,
                            count: conflict.len(),
                        });
                    }
                    warn!(
                        "{}: skipping {} edit(s) in {}: {}",
                        rewriter.name(),
                        plan.edits.len(),
                        path,
                        conflict
                    );
                    session.diagnostics_mut().conflicts.push(ConflictRecord {
                        pass: kind,
                        unit: path.clone(),
                        conflict: conflict.clone(),
                    });
                    report.outcomes.push((path, UnitOutcome::Conflicted { conflict }));
                    continue;
                }
            };

            let rewritten = match ProgramUnit::parse(path.clone(), text) {
                Ok(unit) => unit,
                Err(source) => {
                    if self.policy == ConflictPolicy::Abort {
                        return Err(RewriteError::Reparse { path, source });
                    }
                    warn!("{}: rewrite of {} does not parse, keeping original: {}", rewriter.name(), path, source);
                    session.diagnostics_mut().rejected.push(path.clone());
                    report.outcomes.push((
                        path,
                        UnitOutcome::Rejected {
                            reason: source.to_string(),
                        },
                    ));
                    continue;
                }
            };
            program.replace_unit(plan.unit, rewritten);

            if let Some(role) = plan.helper {
                if !requested.iter().any(|(r, _)| *r == role) {
                    requested.push((role, plan.unit));
                }
            }
            report.outcomes.push((
                path,
                UnitOutcome::Rewritten {
                    edits: plan.edits.len(),
                    helper: plan.helper,
                },
            ));
        }

        for (role, unit) in requested {
            if session.is_injected(role) {
                continue;
            }
            inject(program, role, session, Some(unit))?;
            report.injected.push(role);
        }

        info!(
            "{:>20} {} unit(s), {} edit(s), {} skipped",
            rewriter.name(),
            report.rewritten(),
            report.edits(),
            report.skipped()
        );
        Ok(report)
    }
}

/// Convenience function to run the default pass.
pub fn run(
    program: &mut Program,
    rewriter: &dyn Rewriter,
    session: &mut Session,
    policy: ConflictPolicy,
) -> Result<PassReport, RewriteError> {
    DefaultPass { policy }.run(program, rewriter, session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorConfig, NameGenerator};
    use crate::EditPlan;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shroud_core::{SourceEdit, Span};

    /// Plans two overlapping edits in every unit.
    struct Clashing;

    impl Rewriter for Clashing {
        fn kind(&self) -> RewriteKind {
            RewriteKind::StringEncryption
        }

        fn plan_unit(&self, _ctx: &Context<'_>, unit: usize, _session: &mut Session) -> Result<EditPlan, RewriteError> {
            let mut plan = EditPlan::new(unit);
            plan.push(SourceEdit::replace(Span::new(0, 5), "x"));
            plan.push(SourceEdit::replace(Span::new(2, 7), "y"));
            Ok(plan)
        }
    }

    /// Breaks the syntax of the first unit.
    struct Breaking;

    impl Rewriter for Breaking {
        fn kind(&self) -> RewriteKind {
            RewriteKind::StringEncryption
        }

        fn plan_unit(&self, _ctx: &Context<'_>, unit: usize, _session: &mut Session) -> Result<EditPlan, RewriteError> {
            let mut plan = EditPlan::new(unit);
            if unit == 0 {
                plan.push(SourceEdit::insert(0, "{"));
            }
            Ok(plan.needs(HelperRole::StringDecryptor))
        }
    }

    fn setup() -> (Program, Session) {
        let program =
            Program::from_sources("App", [("a.cs", "class A {}"), ("b.cs", "class B {}")]).unwrap();
        let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(2)).unwrap();
        let session = Session::for_program(&program, generator).unwrap();
        (program, session)
    }

    #[test]
    fn conflicting_units_are_skipped_and_recorded() {
        let (mut program, mut session) = setup();
        let report = run(&mut program, &Clashing, &mut session, ConflictPolicy::Skip).unwrap();
        assert_eq!(report.skipped(), 2);
        assert_eq!(program.units()[0].text(), "class A {}");
        assert_eq!(session.diagnostics().conflicts.len(), 2);
        assert_eq!(session.diagnostics().conflicts[0].unit, "a.cs");
    }

    #[test]
    fn abort_policy_fails_on_conflict() {
        let (mut program, mut session) = setup();
        let err = run(&mut program, &Clashing, &mut session, ConflictPolicy::Abort).unwrap_err();
        assert!(matches!(err, RewriteError::Conflict { ref path, count: 1 } if path == "a.cs"));
    }

    #[test]
    fn unparsable_rewrites_keep_the_original() {
        let (mut program, mut session) = setup();
        let report = run(&mut program, &Breaking, &mut session, ConflictPolicy::Skip).unwrap();
        assert_eq!(program.units()[0].text(), "class A {}");
        assert_eq!(session.diagnostics().rejected, vec!["a.cs".to_string()]);
        assert!(matches!(report.outcomes[1].1, UnitOutcome::Unchanged));
        assert!(report.injected.is_empty());
    }
}
