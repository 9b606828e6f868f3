//! Helper declarations that rewritten code calls into.
//!
//! Each [`HelperRole`] owns a C# template. Injection fills the template with
//! run values, checks it parses to exactly one top-level type, then merges it
//! into an existing unit (missing `using` directives first, declaration
//! appended in its own namespace block) or adds it as a unit of its own.

use crate::session::{InjectedHelper, Session};
use serde::{Deserialize, Serialize};
use shroud_core::lexer::quote_literal;
use shroud_core::syntax::ItemKind;
use shroud_core::{apply_edits, Program, ProgramUnit, SourceEdit, SyntaxTree};
use shroud_utils::errors::InjectError;
use std::collections::HashSet;
use tracing::debug;

/// Unit path of the resource accessor class.
pub const RESOURCE_ACCESSORS_PATH: &str = "Properties/Resources.Designer.cs";

const ACCESSORS_MARKER: &str = "/*{{ACCESSORS}}*/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HelperRole {
    StringDecryptor,
    ForeignCallLoader,
    ResourceLoader,
    TypeLoader,
    ResourceAccessors,
}

impl HelperRole {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StringDecryptor => "string-decryptor",
            Self::ForeignCallLoader => "foreign-call-loader",
            Self::ResourceLoader => "resource-loader",
            Self::TypeLoader => "type-loader",
            Self::ResourceAccessors => "resource-accessors",
        }
    }

    pub const fn class_name(&self) -> &'static str {
        match self {
            Self::StringDecryptor => "StringEncryptor",
            Self::ForeignCallLoader => "PInvokeLoader",
            Self::ResourceLoader => "StegoResourceLoader",
            Self::TypeLoader => "IndirectObjectLoader",
            Self::ResourceAccessors => "Resources",
        }
    }

    const fn template(&self) -> &'static str {
        match self {
            Self::StringDecryptor => include_str!("../templates/StringEncryptor.cs"),
            Self::ForeignCallLoader => include_str!("../templates/PInvokeLoader.cs"),
            Self::ResourceLoader => include_str!("../templates/StegoResourceLoader.cs"),
            Self::TypeLoader => include_str!("../templates/IndirectObjectLoader.cs"),
            Self::ResourceAccessors => include_str!("../templates/Resources.cs"),
        }
    }

    /// Namespace the helper is declared in.
    pub fn namespace(&self, session: &Session) -> String {
        match self {
            Self::ResourceAccessors => format!("{}.Properties", session.root_namespace()),
            _ => session.namespace().to_string(),
        }
    }

    pub fn type_name(&self, session: &Session) -> String {
        format!("{}.{}", self.namespace(session), self.class_name())
    }

    /// `global::`-qualified type name for rewritten call sites.
    pub fn reference(&self, session: &Session) -> String {
        format!("global::{}", self.type_name(session))
    }
}

/// A filled template, split into the pieces a merge needs.
#[derive(Debug, Clone)]
pub struct HelperSource {
    pub role: HelperRole,
    /// Compilation-unit level `using` directives, verbatim.
    pub usings: Vec<String>,
    /// The type declaration, verbatim.
    pub declaration: String,
    /// The whole filled template.
    pub text: String,
}

/// Fills the template for `role` and validates its shape.
pub fn render(role: HelperRole, session: &Session) -> Result<HelperSource, InjectError> {
    let accessors = session
        .payloads()
        .iter()
        .map(|p| {
            format!(
                "internal static global::System.IO.UnmanagedMemoryStream {0} => ResourceManager.GetStream(\"{0}\", resourceCulture);",
                p.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");
    let text = role
        .template()
        .replace("{{NAMESPACE}}", session.namespace())
        .replace("{{KEY}}", &quote_literal(session.key()))
        .replace("{{PROGRAM_NAME}}", session.root_namespace())
        .replace(ACCESSORS_MARKER, &accessors);

    let tree = SyntaxTree::parse(text.as_str()).map_err(|source| InjectError::Template {
        role: role.name().to_string(),
        source,
    })?;
    let top_level: Vec<_> = tree.types.iter().filter(|t| t.parent.is_none()).collect();
    let [declaration] = top_level.as_slice() else {
        return Err(InjectError::NotSingleDeclaration {
            role: role.name().to_string(),
            found: top_level.len(),
        });
    };
    let usings = tree
        .usings
        .iter()
        .filter(|u| u.namespace.is_none())
        .map(|u| tree.slice(u.range).to_string())
        .collect();

    Ok(HelperSource {
        role,
        usings,
        declaration: tree.slice(declaration.range).to_string(),
        text,
    })
}

/// Injects `role` into `program` unless the session already has it.
///
/// The declaration goes into unit `preferred` when that unit can take a
/// namespace block, otherwise into the first unit that can, otherwise into a
/// new unit. Returns the index of the unit holding the helper.
pub fn inject(
    program: &mut Program,
    role: HelperRole,
    session: &mut Session,
    preferred: Option<usize>,
) -> Result<usize, InjectError> {
    if let Some(existing) = session.injected().find(|h| h.role == role) {
        if let Some(index) = program.units().iter().position(|u| u.path() == existing.unit) {
            return Ok(index);
        }
    }

    let helper = render(role, session)?;
    let namespace = role.namespace(session);

    let index = if role == HelperRole::ResourceAccessors {
        add_unit(program, RESOURCE_ACCESSORS_PATH, helper.text.clone())?
    } else {
        match pick_target(program, preferred) {
            Some(index) => {
                let unit = merge(&program.units()[index], &helper, &namespace)?;
                program.replace_unit(index, unit);
                index
            }
            None => {
                let path = format!("{}.cs", role.class_name());
                add_unit(program, &path, helper.text.clone())?
            }
        }
    };

    let unit = program.units()[index].path().to_string();
    debug!("Injected {} into {}", role.name(), unit);
    session.record_injection(InjectedHelper {
        role,
        unit,
        type_name: role.type_name(session),
    });
    Ok(index)
}

/// A unit with a file-scoped namespace cannot hold a second namespace block.
fn pick_target(program: &Program, preferred: Option<usize>) -> Option<usize> {
    let accepts = |u: &ProgramUnit| !u.tree().has_file_scoped_namespace();
    preferred
        .filter(|&i| program.unit(i).is_some_and(accepts))
        .or_else(|| program.units().iter().position(accepts))
}

fn add_unit(program: &mut Program, path: &str, text: String) -> Result<usize, InjectError> {
    let mut candidate = path.to_string();
    let mut suffix = 1;
    while program.units().iter().any(|u| u.path() == candidate) {
        candidate = match path.strip_suffix(".cs") {
            Some(stem) => format!("{stem}.{suffix}.cs"),
            None => format!("{path}.{suffix}"),
        };
        suffix += 1;
    }
    let unit = ProgramUnit::parse(candidate.clone(), text).map_err(|source| InjectError::Merge {
        path: candidate,
        source,
    })?;
    Ok(program.push_unit(unit)?)
}

fn normalize(directive: &str) -> String {
    directive.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Insertions that add the helper's missing usings after the last
/// top-level directive and append the declaration in its own namespace.
fn merge_edits(tree: &SyntaxTree, helper: &HelperSource, namespace: &str) -> Vec<SourceEdit> {
    let text = tree.text.as_str();
    let present: HashSet<String> = tree
        .usings
        .iter()
        .filter(|u| u.namespace.is_none())
        .map(|u| normalize(tree.slice(u.range)))
        .collect();
    let missing: Vec<&str> = helper
        .usings
        .iter()
        .filter(|u| !present.contains(&normalize(u)))
        .map(String::as_str)
        .collect();

    let anchor = tree
        .items
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::Using | ItemKind::ExternAlias))
        .next_back()
        .map(|i| tree.span(i.range).end);
    let usings = match anchor {
        _ if missing.is_empty() => None,
        Some(at) => Some((at, missing.iter().map(|u| format!("\n{u}")).collect::<String>())),
        None => {
            let at = if text.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
            Some((at, format!("{}\n\n", missing.join("\n"))))
        }
    };

    let mut block = String::new();
    if !text.is_empty() && !text.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(&format!("\nnamespace {namespace}\n{{\n{}\n}}\n", helper.declaration));

    match usings {
        // Both land at the end of the unit; one insertion keeps their order.
        Some((at, usings)) if at == text.len() => {
            vec![SourceEdit::insert(at, format!("{usings}{block}"))]
        }
        Some((at, usings)) => vec![
            SourceEdit::insert(at, usings),
            SourceEdit::insert(text.len(), block),
        ],
        None => vec![SourceEdit::insert(text.len(), block)],
    }
}

/// `unit` with the helper merged in, checked to declare the helper type in
/// `namespace`.
fn merge(unit: &ProgramUnit, helper: &HelperSource, namespace: &str) -> Result<ProgramUnit, InjectError> {
    let path = unit.path().to_string();
    let edits = merge_edits(unit.tree(), helper, namespace);
    let text = apply_edits(&unit.tree().text, &edits).map_err(|conflict| InjectError::Placement {
        path: path.clone(),
        reason: conflict.to_string(),
    })?;
    let merged = ProgramUnit::parse(path.clone(), text).map_err(|source| InjectError::Merge {
        path: path.clone(),
        source,
    })?;
    let class = helper.role.class_name();
    let declared = merged
        .tree()
        .types
        .iter()
        .any(|t| t.parent.is_none() && t.name == class && t.namespace == namespace);
    if !declared {
        return Err(InjectError::Placement {
            path,
            reason: format!("{namespace}.{class} is not declared after the merge"),
        });
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorConfig, NameGenerator};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(program: &Program) -> Session {
        let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(9)).unwrap();
        Session::for_program(program, generator).unwrap()
    }

    #[test]
    fn every_template_renders_one_declaration() {
        let program = Program::from_sources("App", [("a.cs", "class A {}")]).unwrap();
        let mut session = session(&program);
        session.add_payload("Blob".to_string(), vec![1, 2, 3]);
        for role in [
            HelperRole::StringDecryptor,
            HelperRole::ForeignCallLoader,
            HelperRole::ResourceLoader,
            HelperRole::TypeLoader,
            HelperRole::ResourceAccessors,
        ] {
            let helper = render(role, &session).unwrap();
            assert!(helper.declaration.contains(role.class_name()), "{}", role.name());
            assert!(!helper.text.contains("{{"), "{}", role.name());
        }
    }

    #[test]
    fn key_is_embedded_as_a_literal() {
        let program = Program::from_sources("App", [("a.cs", "class A {}")]).unwrap();
        let session = session(&program);
        let helper = render(HelperRole::StringDecryptor, &session).unwrap();
        assert!(helper.text.contains(&quote_literal(session.key())));
        assert_eq!(helper.usings, vec!["using System;", "using System.Text;"]);
    }

    #[test]
    fn foreign_call_loader_caches_by_full_signature() {
        let program = Program::from_sources("App", [("a.cs", "class A {}")]).unwrap();
        let session = session(&program);
        let helper = render(HelperRole::ForeignCallLoader, &session).unwrap();
        assert!(helper.text.contains("names[i] = parameterTypes[i].FullName;"));
        assert!(helper.text.contains("+ \")\" + returnType.FullName"));
        assert!(helper.text.contains("callingConvention, charSet);"));
        assert!(!helper.text.contains("parameterTypes.Length;\n"));
    }

    #[test]
    fn merges_missing_usings_and_declaration() {
        let src = "using System;\nusing System.IO;\n\nnamespace Demo\n{\n    class A {}\n}\n";
        let mut program = Program::from_sources("App", [("a.cs", src)]).unwrap();
        let mut session = session(&program);
        let index = inject(&mut program, HelperRole::StringDecryptor, &mut session, Some(0)).unwrap();
        assert_eq!(index, 0);

        let text = program.units()[0].text();
        assert_eq!(text.matches("using System;").count(), 1);
        assert!(text.contains("using System.IO;\nusing System.Text;"));
        assert!(text.contains(&format!("namespace {}\n{{", session.namespace())));
        assert!(session.is_injected(HelperRole::StringDecryptor));
        assert!(session.is_helper_symbol(&format!("{}.StringEncryptor", session.namespace())));
    }

    #[test]
    fn merge_only_inserts_into_the_unit() {
        let src = "class A { }";
        let program = Program::from_sources("App", [("a.cs", src)]).unwrap();
        let session = session(&program);
        let helper = render(HelperRole::TypeLoader, &session).unwrap();
        let edits = merge_edits(program.units()[0].tree(), &helper, session.namespace());
        assert!(edits.iter().all(|e| e.span.is_empty()));

        let merged = merge(&program.units()[0], &helper, session.namespace()).unwrap();
        assert!(merged.text().starts_with("using System;"));
        assert!(merged.text().contains("class A { }\n\nnamespace "));
        let tree = merged.tree();
        assert_eq!(tree.types.len(), 2);
        assert_eq!(tree.types[1].namespace, session.namespace());
    }

    #[test]
    fn file_scoped_units_are_passed_over() {
        let mut program = Program::from_sources(
            "App",
            [("a.cs", "namespace Demo;\nclass A {}\n"), ("b.cs", "namespace Other { class B {} }")],
        )
        .unwrap();
        let mut session = session(&program);
        let index = inject(&mut program, HelperRole::TypeLoader, &mut session, Some(0)).unwrap();
        assert_eq!(index, 1);
        assert!(program.units()[1].text().contains("class IndirectObjectLoader"));
    }

    #[test]
    fn falls_back_to_a_new_unit() {
        let mut program = Program::from_sources("App", [("a.cs", "namespace Demo;\nclass A {}\n")]).unwrap();
        let mut session = session(&program);
        let index = inject(&mut program, HelperRole::ForeignCallLoader, &mut session, Some(0)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(program.units()[1].path(), "PInvokeLoader.cs");
    }

    #[test]
    fn second_injection_is_a_no_op() {
        let mut program = Program::from_sources("App", [("a.cs", "class A {}")]).unwrap();
        let mut session = session(&program);
        inject(&mut program, HelperRole::StringDecryptor, &mut session, None).unwrap();
        let before = program.units()[0].text().to_string();
        inject(&mut program, HelperRole::StringDecryptor, &mut session, None).unwrap();
        assert_eq!(program.units()[0].text(), before);
    }

    #[test]
    fn accessors_live_in_their_own_unit() {
        let mut program = Program::from_sources("My-App", [("a.cs", "class A {}")]).unwrap();
        let mut session = session(&program);
        session.add_payload("Clip".to_string(), vec![0; 4]);
        let index = inject(&mut program, HelperRole::ResourceAccessors, &mut session, None).unwrap();
        let unit = &program.units()[index];
        assert_eq!(unit.path(), RESOURCE_ACCESSORS_PATH);
        assert!(unit.text().contains("namespace My_App.Properties"));
        assert!(unit.text().contains("GetStream(\"Clip\", resourceCulture)"));
    }
}
