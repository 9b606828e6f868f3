//! Mutable state owned by one obfuscation run.

use crate::generator::NameGenerator;
use crate::identity::Resolution;
use crate::inject::HelperRole;
use crate::RewriteKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use shroud_core::edit::EditConflict;
use shroud_core::lexer::{is_ident_continue, is_ident_start};
use shroud_core::Program;
use shroud_utils::errors::GeneratorError;

/// Symbol identity key to generated name. Append-only for the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameMap {
    entries: IndexMap<String, String>,
}

impl RenameMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Records `name` for `key` unless the key already has one, returning
    /// the name that is now on record.
    pub fn record(&mut self, key: &str, name: String) -> &str {
        self.entries.entry(key.to_string()).or_insert(name)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// First key, in insertion order, whose last `::` segment is `text`.
    pub fn key_ending_with(&self, text: &str) -> Option<&str> {
        let suffix = format!("::{text}");
        self.entries
            .keys()
            .find(|k| k.ends_with(&suffix))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A payload hidden in a container and packaged as a named resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPayload {
    pub name: String,
    pub data: Vec<u8>,
}

impl EmbeddedPayload {
    /// Keccak-256 of the container bytes, hex encoded.
    pub fn digest(&self) -> String {
        hex::encode(Keccak256::digest(&self.data))
    }
}

/// Where a helper declaration ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedHelper {
    pub role: HelperRole,
    pub unit: String,
    /// Fully-qualified type name.
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub pass: RewriteKind,
    pub unit: String,
    pub conflict: EditConflict,
}

/// Counters for the renaming pass and every skipped edit set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub exact: usize,
    pub heuristic: usize,
    pub unknown: usize,
    /// Unknown occurrences that received an untracked fresh name.
    pub unseen_renamed: usize,
    /// Occurrences bound outside the program or deliberately kept.
    pub skipped: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub rejected: Vec<String>,
}

impl Diagnostics {
    pub fn count(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Exact => self.exact += 1,
            Resolution::Heuristic => self.heuristic += 1,
            Resolution::Unknown => self.unknown += 1,
        }
    }
}

/// Run-scoped state threaded through every pass: the generator, the rename
/// maps, the run's encryption key and namespace, hidden payloads and the
/// helpers injected so far.
#[derive(Debug)]
pub struct Session {
    program_name: String,
    root_namespace: String,
    key: String,
    namespace: String,
    generator: NameGenerator,
    renames: RenameMap,
    namespaces: IndexMap<String, String>,
    payloads: Vec<EmbeddedPayload>,
    injected: IndexMap<HelperRole, InjectedHelper>,
    diagnostics: Diagnostics,
}

impl Session {
    /// Draws the run's key and namespace from `generator`.
    pub fn new(program_name: &str, mut generator: NameGenerator) -> Result<Self, GeneratorError> {
        let mut key = generator.random_string()?;
        if key.is_empty() {
            key = generator.identifier()?;
        }
        let namespace = generator.identifier()?;
        Ok(Self {
            program_name: program_name.to_string(),
            root_namespace: root_namespace(program_name),
            key,
            namespace,
            generator,
            renames: RenameMap::default(),
            namespaces: IndexMap::new(),
            payloads: Vec::new(),
            injected: IndexMap::new(),
            diagnostics: Diagnostics::default(),
        })
    }

    /// Like [`Session::new`], with every identifier of `program` reserved
    /// first so generated names never collide with surviving ones.
    pub fn for_program(program: &Program, mut generator: NameGenerator) -> Result<Self, GeneratorError> {
        generator.reserve(program.identifiers());
        Self::new(program.name(), generator)
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Program name as a namespace, used for the embedded resource class.
    pub fn root_namespace(&self) -> &str {
        &self.root_namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The single namespace every user namespace collapses into.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn generator(&mut self) -> &mut NameGenerator {
        &mut self.generator
    }

    pub fn fresh_identifier(&mut self) -> Result<String, GeneratorError> {
        self.generator.identifier()
    }

    pub fn renames(&self) -> &RenameMap {
        &self.renames
    }

    pub fn renames_mut(&mut self) -> &mut RenameMap {
        &mut self.renames
    }

    /// Generated name for a namespace occurrence; always the run namespace.
    pub fn namespace_for(&mut self, occurrence: &str) -> &str {
        self.namespaces
            .entry(occurrence.to_string())
            .or_insert_with(|| self.namespace.clone())
    }

    pub fn renamed_namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn add_payload(&mut self, name: String, data: Vec<u8>) {
        self.payloads.push(EmbeddedPayload { name, data });
    }

    pub fn payloads(&self) -> &[EmbeddedPayload] {
        &self.payloads
    }

    pub fn take_payloads(&mut self) -> Vec<EmbeddedPayload> {
        std::mem::take(&mut self.payloads)
    }

    pub fn is_injected(&self, role: HelperRole) -> bool {
        self.injected.contains_key(&role)
    }

    pub fn record_injection(&mut self, helper: InjectedHelper) {
        self.injected.insert(helper.role, helper);
    }

    pub fn injected(&self) -> impl Iterator<Item = &InjectedHelper> {
        self.injected.values()
    }

    /// Whether `display` names an injected helper or something inside one.
    pub fn is_helper_symbol(&self, display: &str) -> bool {
        self.injected.values().any(|h| {
            display == h.type_name
                || display
                    .strip_prefix(h.type_name.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }
}

/// `My-App.v2` becomes `My_App.v2`; segments never start with a digit.
/// `program_name` turned into a valid dotted namespace.
pub fn root_namespace(program_name: &str) -> String {
    let segments: Vec<String> = program_name
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut out: String = segment
                .chars()
                .map(|c| if is_ident_continue(c) { c } else { '_' })
                .collect();
            if !out.starts_with(is_ident_start) {
                out.insert(0, '_');
            }
            out
        })
        .collect();
    if segments.is_empty() {
        "Program".to_string()
    } else {
        segments.join(".")
    }
}
