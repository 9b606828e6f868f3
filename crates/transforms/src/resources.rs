//! Packages hidden payloads as a managed resource bundle.
//!
//! Each payload becomes a file under `Properties/Resources/` and a
//! file-reference entry in `Properties/Resources.resx`, compiled into the
//! `<program>.Properties.Resources.resources` manifest resource that the
//! injected accessor class reads.

use crate::session::EmbeddedPayload;
use shroud_utils::errors::EmitError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const RESX_PATH: &str = "Properties/Resources.resx";
pub const RESOURCE_DIR: &str = "Properties/Resources";

const RESX_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<root>
  <resheader name="resmimetype">
    <value>text/microsoft-resx</value>
  </resheader>
  <resheader name="version">
    <value>2.0</value>
  </resheader>
  <resheader name="reader">
    <value>System.Resources.ResXResourceReader, System.Windows.Forms, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089</value>
  </resheader>
  <resheader name="writer">
    <value>System.Resources.ResXResourceWriter, System.Windows.Forms, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089</value>
  </resheader>
  <assembly alias="System.Windows.Forms" name="System.Windows.Forms, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089" />
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub name: String,
    /// Path of the payload file relative to the project directory.
    pub file: String,
    pub data: Vec<u8>,
}

/// Named payloads ready to be written next to the project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceBundle {
    entries: Vec<ResourceEntry>,
}

impl ResourceBundle {
    /// Builds a bundle whose files carry the carrier's `extension`.
    ///
    /// Fails on duplicate names or names that are not plain identifiers,
    /// since each name is also the accessor property's name.
    pub fn from_payloads(payloads: &[EmbeddedPayload], extension: &str) -> Result<Self, EmitError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let valid = payload
                .name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && payload.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(EmitError::Resources(format!("invalid resource name '{}'", payload.name)));
            }
            if !seen.insert(payload.name.as_str()) {
                return Err(EmitError::Resources(format!("duplicate resource '{}'", payload.name)));
            }
            entries.push(ResourceEntry {
                name: payload.name.clone(),
                file: format!("{RESOURCE_DIR}/{}.{extension}", payload.name),
                data: payload.data.clone(),
            });
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    /// Manifest resource name the bundle compiles to.
    pub fn logical_name(program: &str) -> String {
        format!("{program}.Properties.Resources.resources")
    }

    /// The `.resx` document referencing every payload file.
    pub fn render_resx(&self) -> String {
        let mut out = String::from(RESX_HEADER);
        for entry in &self.entries {
            let relative = entry
                .file
                .strip_prefix("Properties/")
                .unwrap_or(&entry.file)
                .replace('/', "\\");
            out.push_str(&format!(
                "  <data name=\"{}\" type=\"System.Resources.ResXFileRef, System.Windows.Forms\">\n    <value>{};System.IO.MemoryStream, mscorlib</value>\n  </data>\n",
                escape(&entry.name),
                escape(&relative)
            ));
        }
        out.push_str("</root>\n");
        out
    }

    /// Writes the `.resx` and every payload file under `project_dir`.
    pub fn write_to(&self, project_dir: &Path) -> Result<Vec<PathBuf>, EmitError> {
        let mut written = Vec::with_capacity(self.entries.len() + 1);
        if self.is_empty() {
            return Ok(written);
        }
        fs::create_dir_all(project_dir.join(RESOURCE_DIR))?;
        for entry in &self.entries {
            let path = project_dir.join(&entry.file);
            fs::write(&path, &entry.data)?;
            debug!("Wrote resource {} ({} bytes)", entry.name, entry.data.len());
            written.push(path);
        }
        let resx = project_dir.join(RESX_PATH);
        fs::write(&resx, self.render_resx())?;
        written.push(resx);
        Ok(written)
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
