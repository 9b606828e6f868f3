//! Canonical identities for name occurrences.
//!
//! A bound occurrence's identity is `<family display name>::<declared name>`,
//! so every declaration and use of one symbol (and every member of one
//! override family) shares a key. Occurrences the binder could not resolve
//! fall back to a best-effort key, flagged as such.

use crate::session::RenameMap;
use serde::{Deserialize, Serialize};
use shroud_core::{SymbolId, SymbolTable};
use std::fmt;

/// How an identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Bound to a program symbol.
    Exact,
    /// Reused an existing key with the same trailing name.
    Heuristic,
    /// Nothing matched; the key is synthesized from the text alone.
    Unknown,
}

impl Resolution {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Heuristic => "heuristic",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const UNKNOWN_PREFIX: &str = "UNKNOWNSYMBOL";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolIdentity {
    pub key: String,
    pub resolution: Resolution,
}

impl SymbolIdentity {
    /// Identity of a resolved symbol.
    pub fn of_symbol(symbols: &SymbolTable, id: SymbolId) -> Self {
        let root = symbols.family(id);
        Self {
            key: format!("{}::{}", symbols.identity_name(id), symbols.get(root).name),
            resolution: Resolution::Exact,
        }
    }

    /// Identity of an occurrence with no symbol attached.
    ///
    /// With `heuristic` set, an existing key for the same trailing name is
    /// reused so one spelling keeps one name across files.
    pub fn unresolved(text: &str, renames: &RenameMap, heuristic: bool) -> Self {
        if heuristic {
            if let Some(key) = renames.key_ending_with(text) {
                return Self {
                    key: key.to_string(),
                    resolution: Resolution::Heuristic,
                };
            }
        }
        Self {
            key: format!("{UNKNOWN_PREFIX}::{text}"),
            resolution: Resolution::Unknown,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.resolution == Resolution::Exact
    }
}
