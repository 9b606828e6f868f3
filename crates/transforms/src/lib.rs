pub mod carrier;
pub mod crypto;
pub mod emit;
pub mod foreign_call;
pub mod generator;
pub mod identity;
pub mod inject;
pub mod namespace;
pub mod obfuscator;
pub mod pass;
pub mod rename;
pub mod resources;
pub mod session;
pub mod stego;
pub mod strings;
pub mod type_reference;
mod util;

use crate::inject::HelperRole;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use shroud_core::{Binder, Program, SourceEdit, SymbolTable};
use shroud_utils::errors::RewriteError;
use std::fmt;
use std::str::FromStr;

/// The rewrite passes, in the only order the pipeline runs them.
///
/// Earlier passes match on original names and markers, so renaming comes
/// last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteKind {
    ForeignCall,
    TypeReference,
    Steganography,
    StringEncryption,
    NamespaceCollapse,
    IdentifierRenaming,
}

impl RewriteKind {
    pub const ALL: [Self; 6] = [
        Self::ForeignCall,
        Self::TypeReference,
        Self::Steganography,
        Self::StringEncryption,
        Self::NamespaceCollapse,
        Self::IdentifierRenaming,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::ForeignCall => "foreign-call",
            Self::TypeReference => "type-reference",
            Self::Steganography => "steganography",
            Self::StringEncryption => "string-encryption",
            Self::NamespaceCollapse => "namespace-collapse",
            Self::IdentifierRenaming => "identifier-renaming",
        }
    }
}

impl fmt::Display for RewriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RewriteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        let alias = match wanted.as_str() {
            "pinvoke" | "foreign" => "foreign-call",
            "types" | "type-reflection" => "type-reference",
            "stego" | "resources" => "steganography",
            "strings" => "string-encryption",
            "namespaces" => "namespace-collapse",
            "identifiers" | "rename" => "identifier-renaming",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|k| k.name() == alias)
            .ok_or_else(|| format!("unknown pass '{s}'"))
    }
}

/// Edits computed for one unit, plus the helper its rewritten code calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditPlan {
    pub unit: usize,
    pub edits: Vec<SourceEdit>,
    pub helper: Option<HelperRole>,
}

impl EditPlan {
    pub fn new(unit: usize) -> Self {
        Self {
            unit,
            ..Default::default()
        }
    }

    pub fn push(&mut self, edit: SourceEdit) {
        self.edits.push(edit);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Requests `role` if any edit was planned.
    pub fn needs(mut self, role: HelperRole) -> Self {
        if !self.edits.is_empty() {
            self.helper = Some(role);
        }
        self
    }
}

/// Read-only view of the program a pass plans against.
#[derive(Debug)]
pub struct Context<'a> {
    pub program: &'a Program,
    pub symbols: &'a SymbolTable,
    pub binder: Binder<'a>,
}

impl<'a> Context<'a> {
    pub fn new(program: &'a Program, symbols: &'a SymbolTable) -> Self {
        Self {
            program,
            symbols,
            binder: Binder::new(program, symbols),
        }
    }
}

/// A source rewrite pass.
pub trait Rewriter {
    fn kind(&self) -> RewriteKind;

    /// Returns the pass name for logging and reports.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Plans the edits for one unit.
    fn plan_unit(
        &self,
        _ctx: &Context<'_>,
        unit: usize,
        _session: &mut Session,
    ) -> Result<EditPlan, RewriteError> {
        Ok(EditPlan::new(unit))
    }

    /// Plans every unit. Passes that must see the whole program before
    /// deciding anything override this instead of [`Rewriter::plan_unit`].
    fn plan_program(&self, ctx: &Context<'_>, session: &mut Session) -> Result<Vec<EditPlan>, RewriteError> {
        (0..ctx.program.len())
            .map(|unit| self.plan_unit(ctx, unit, session))
            .collect()
    }
}
