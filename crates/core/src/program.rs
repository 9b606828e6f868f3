//! Program units and the program they form.

use crate::syntax::SyntaxTree;
use sha3::{Digest, Keccak256};
use shroud_utils::errors::{ProgramError, SyntaxError};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// One file's source text and its parsed tree.
///
/// Units are never edited in place. A rewrite produces a new unit from new
/// text, so trees handed out earlier stay valid.
#[derive(Debug, Clone)]
pub struct ProgramUnit {
    path: String,
    tree: SyntaxTree,
}

impl ProgramUnit {
    pub fn parse(path: impl Into<String>, text: impl Into<String>) -> Result<Self, SyntaxError> {
        Ok(Self {
            path: path.into(),
            tree: SyntaxTree::parse(text)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
    }

    pub fn text(&self) -> &str {
        &self.tree.text
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    /// Keccak-256 of the unit text, hex encoded.
    pub fn digest(&self) -> String {
        hex::encode(Keccak256::digest(self.tree.text.as_bytes()))
    }
}

/// The full set of units compiled together.
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    units: Vec<ProgramUnit>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
        }
    }

    /// Parses `(path, text)` pairs into a program, keeping their order.
    pub fn from_sources<I, P, T>(name: impl Into<String>, sources: I) -> Result<Self, ProgramError>
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: Into<String>,
    {
        let mut program = Self::new(name);
        for (path, text) in sources {
            program.add_source(path, text)?;
        }
        Ok(program)
    }

    /// Loads every `.cs` file under `dir`, ordered by relative path.
    pub fn load_dir(name: impl Into<String>, dir: &Path) -> Result<Self, ProgramError> {
        let mut files = Vec::new();
        collect_sources(dir, &mut files)?;
        files.sort();

        let mut program = Self::new(name);
        for file in files {
            let text = fs::read_to_string(&file).map_err(|source| ProgramError::FileRead {
                path: file.display().to_string(),
                source,
            })?;
            let relative = file
                .strip_prefix(dir)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");
            program.add_source(relative, text)?;
        }
        Ok(program)
    }

    pub fn add_source(&mut self, path: impl Into<String>, text: impl Into<String>) -> Result<usize, ProgramError> {
        let path = path.into();
        let unit = ProgramUnit::parse(path.clone(), text)
            .map_err(|source| ProgramError::Syntax { path, source })?;
        self.push_unit(unit)
    }

    pub fn push_unit(&mut self, unit: ProgramUnit) -> Result<usize, ProgramError> {
        if self.units.iter().any(|u| u.path == unit.path) {
            return Err(ProgramError::DuplicateUnit(unit.path));
        }
        self.units.push(unit);
        Ok(self.units.len() - 1)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[ProgramUnit] {
        &self.units
    }

    pub fn unit(&self, index: usize) -> Option<&ProgramUnit> {
        self.units.get(index)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Swaps in a rewritten unit and hands back the one it replaces.
    pub fn replace_unit(&mut self, index: usize, unit: ProgramUnit) -> Option<ProgramUnit> {
        let slot = self.units.get_mut(index)?;
        Some(std::mem::replace(slot, unit))
    }

    /// Every identifier spelled anywhere in the program.
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.units
            .iter()
            .flat_map(|u| {
                let tree = u.tree();
                (0..tree.tokens.len()).filter_map(move |i| tree.ident(i).map(str::to_string))
            })
            .collect()
    }
}

fn collect_sources(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), ProgramError> {
    let entries = fs::read_dir(dir).map_err(|source| ProgramError::FileRead {
        path: dir.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ProgramError::FileRead {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            let skip = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n == "bin" || n == "obj" || n.starts_with('.'));
            if !skip {
                collect_sources(&path, out)?;
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("cs") {
            out.push(path);
        }
    }
    Ok(())
}
