//! Identifier renaming.
//!
//! Runs in two sweeps over the whole program so every file agrees on one
//! name per symbol:
//!
//! 1. Every occurrence the binder resolves to a program symbol gets the name
//!    recorded for the symbol's identity, minting one on first sight.
//! 2. Occurrences the binder could not resolve reuse a recorded name when
//!    their identity (exact or suffix-guessed) has one. Otherwise they are
//!    left alone, or given an untracked fresh name when configured to.

use crate::identity::{Resolution, SymbolIdentity};
use crate::session::Session;
use crate::{Context, EditPlan, RewriteKind, Rewriter};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use shroud_core::symbols::Origin;
use shroud_core::{Binding, SourceEdit, SymbolId, SymbolKind, SyntaxTree};
use shroud_utils::errors::{GeneratorError, RewriteError};
use tracing::debug;

/// Member names the runtime or compiler looks up by spelling.
pub const PROTOCOL_MEMBERS: &[&str] = &[
    "GetEnumerator",
    "MoveNext",
    "Current",
    "Reset",
    "Dispose",
    "DisposeAsync",
    "GetAsyncEnumerator",
    "GetAwaiter",
    "GetResult",
    "IsCompleted",
    "OnCompleted",
    "UnsafeOnCompleted",
    "Deconstruct",
    "Add",
    "Select",
    "SelectMany",
    "Where",
    "Join",
    "GroupJoin",
    "GroupBy",
    "OrderBy",
    "OrderByDescending",
    "ThenBy",
    "ThenByDescending",
    "Cast",
    "Slice",
    "Length",
    "Count",
    "GetPinnableReference",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    /// Give unresolved usages with no recorded name a fresh, untracked name
    pub rename_unseen_identifiers: bool,
    /// Name of the static method the runtime starts the program from
    pub entry_point: String,
    /// Member names never renamed
    pub reserved_names: Vec<String>,
    /// Guess an identity for unresolved usages by trailing name
    pub heuristic_fallback: bool,
    /// Keep public instance members of types deriving from outside the program
    pub protect_external_contracts: bool,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            rename_unseen_identifiers: false,
            entry_point: "Main".to_string(),
            reserved_names: PROTOCOL_MEMBERS.iter().map(|s| s.to_string()).collect(),
            heuristic_fallback: true,
            protect_external_contracts: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierRenamer {
    config: RenameConfig,
}

impl IdentifierRenamer {
    pub fn new(config: RenameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenameConfig {
        &self.config
    }

    fn is_reserved(&self, name: &str) -> bool {
        self.config.reserved_names.iter().any(|r| r == name)
    }

    /// Why a symbol keeps its name, if it does.
    fn keep_reason(&self, ctx: &Context<'_>, session: &Session, id: SymbolId) -> Option<&'static str> {
        let symbol = ctx.symbols.get(id);
        if symbol.kind == SymbolKind::Namespace {
            return Some("namespace");
        }
        if symbol.is_extern {
            return Some("foreign import");
        }
        let root = ctx.symbols.get(ctx.symbols.family(id));
        if symbol.external || root.external {
            return Some("external contract");
        }
        if symbol.kind == SymbolKind::Method && symbol.is_static && symbol.name == self.config.entry_point {
            return Some("entry point");
        }
        if symbol.kind.is_member() && self.is_reserved(&symbol.name) {
            return Some("reserved");
        }
        if session.is_helper_symbol(&symbol.display) {
            return Some("helper");
        }
        if self.config.protect_external_contracts
            && symbol.kind.is_member()
            && !symbol.is_static
            && symbol
                .parent
                .is_some_and(|owner| ctx.symbols.has_external_ancestry(owner))
            && self.is_visible(ctx, id)
        {
            return Some("inherited contract");
        }
        None
    }

    /// Whether any declaration of the member is public or protected.
    fn is_visible(&self, ctx: &Context<'_>, id: SymbolId) -> bool {
        ctx.symbols.get(id).origins.iter().any(|origin| match *origin {
            Origin::Member { unit, decl } => ctx
                .program
                .unit(unit)
                .and_then(|u| u.tree().members.get(decl))
                .is_some_and(|m| m.has_modifier("public") || m.has_modifier("protected")),
            _ => false,
        })
    }

    /// The occurrence spells the symbol's own name, or the short form of an
    /// attribute class name. Alias spellings are left to their directive.
    fn spells_symbol(tree: &SyntaxTree, token: usize, text: &str, name: &str) -> bool {
        text == name
            || (tree.in_attribute(token)
                && name.strip_suffix("Attribute").is_some_and(|short| short == text))
    }

    fn name_for(identity: &SymbolIdentity, session: &mut Session) -> Result<String, GeneratorError> {
        if let Some(existing) = session.renames().get(&identity.key) {
            return Ok(existing.to_string());
        }
        let fresh = session.fresh_identifier()?;
        Ok(session.renames_mut().record(&identity.key, fresh).to_string())
    }
}

/// Whether `token` sits inside an injected helper class.
fn in_helper(tree: &SyntaxTree, token: usize, session: &Session) -> bool {
    let Some(mut index) = tree.type_at(token) else {
        return false;
    };
    while let Some(parent) = tree.types[index].parent {
        index = parent;
    }
    let decl = &tree.types[index];
    session.is_helper_symbol(&format!("{}.{}", decl.namespace, decl.name))
}

impl Rewriter for IdentifierRenamer {
    fn kind(&self) -> RewriteKind {
        RewriteKind::IdentifierRenaming
    }

    fn plan_program(&self, ctx: &Context<'_>, session: &mut Session) -> Result<Vec<EditPlan>, RewriteError> {
        let mut edits: Vec<IndexSet<SourceEdit>> = vec![IndexSet::new(); ctx.program.len()];
        let mut unresolved: Vec<(usize, usize)> = Vec::new();

        for (unit, source) in ctx.program.units().iter().enumerate() {
            let tree = source.tree();
            for token in 0..tree.tokens.len() {
                let Some(text) = tree.ident(token) else {
                    continue;
                };
                let id = match ctx.binder.bind(unit, token) {
                    Binding::Symbol(id) => id,
                    Binding::Unbound => {
                        unresolved.push((unit, token));
                        continue;
                    }
                    Binding::Namespace(_) | Binding::TypeParameter | Binding::External => continue,
                };
                let symbol = ctx.symbols.get(id);
                if let Some(reason) = self.keep_reason(ctx, session, id) {
                    debug!("keeping {} '{}' ({})", symbol.kind.label(), symbol.display, reason);
                    session.diagnostics_mut().skipped += 1;
                    continue;
                }
                if !Self::spells_symbol(tree, token, text, &symbol.name) {
                    session.diagnostics_mut().skipped += 1;
                    continue;
                }
                let identity = SymbolIdentity::of_symbol(ctx.symbols, id);
                let name = Self::name_for(&identity, session)?;
                session.diagnostics_mut().count(Resolution::Exact);
                edits[unit].insert(SourceEdit::replace(tree.tokens[token].span, name));
            }
        }

        for (unit, token) in unresolved {
            let tree = ctx.program.units()[unit].tree();
            let Some(text) = tree.ident(token) else {
                continue;
            };
            if self.is_reserved(text) || in_helper(tree, token, session) {
                session.diagnostics_mut().skipped += 1;
                continue;
            }
            let identity = SymbolIdentity::unresolved(text, session.renames(), self.config.heuristic_fallback);
            session.diagnostics_mut().count(identity.resolution);
            let name = match session.renames().get(&identity.key) {
                Some(name) => name.to_string(),
                None if self.config.rename_unseen_identifiers => {
                    session.diagnostics_mut().unseen_renamed += 1;
                    session.fresh_identifier()?
                }
                None => {
                    debug!(
                        "{}:{} '{}' unresolved ({}), left unchanged",
                        ctx.program.units()[unit].path(),
                        tree.tokens[token].span.start,
                        text,
                        identity.resolution
                    );
                    continue;
                }
            };
            debug!(
                "{}:{} '{}' -> '{}' ({} resolution via {})",
                ctx.program.units()[unit].path(),
                tree.tokens[token].span.start,
                text,
                name,
                identity.resolution,
                identity.key
            );
            edits[unit].insert(SourceEdit::replace(tree.tokens[token].span, name));
        }

        Ok(edits
            .into_iter()
            .enumerate()
            .map(|(unit, set)| EditPlan {
                unit,
                edits: set.into_iter().collect(),
                helper: None,
            })
            .collect())
    }
}
