//! Replaces static references to selected external types with runtime
//! lookups through the injected type loader.
//!
//! Locals of a target type are loosened (to `IDisposable` when the type is
//! disposable, otherwise to an inferred or `object` type), construction
//! goes through `InitializeTypeWithArgs(GetTypeFromString(..), args)` and
//! member access on a loosened local is dispatched dynamically.

use crate::inject::HelperRole;
use crate::session::Session;
use crate::util::{render_span, split_args};
use crate::{Context, EditPlan, RewriteKind, Rewriter};
use serde::{Deserialize, Serialize};
use shroud_core::lexer::quote_literal;
use shroud_core::syntax::{LocalKind, TokenRange, UsingDirective};
use shroud_core::types::TypeRef;
use shroud_core::{Binding, SourceEdit, SymbolId, SyntaxTree};
use shroud_utils::errors::RewriteError;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const DISPOSABLE: &str = "global::System.IDisposable";

/// An external type whose references are hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetType {
    /// Fully qualified name, e.g. `System.IO.Compression.GZipStream`.
    pub name: String,
    /// Whether the type implements `IDisposable`.
    #[serde(default)]
    pub disposable: bool,
}

impl TargetType {
    pub fn new(name: impl Into<String>, disposable: bool) -> Self {
        Self {
            name: name.into(),
            disposable,
        }
    }
}

impl Default for TargetType {
    fn default() -> Self {
        Self::new("System.IO.Compression.GZipStream", true)
    }
}

#[derive(Debug, Clone)]
pub struct TypeReferenceRewriter {
    targets: Vec<TargetType>,
}

impl Default for TypeReferenceRewriter {
    fn default() -> Self {
        Self::new(vec![TargetType::default()])
    }
}

impl TypeReferenceRewriter {
    pub fn new(targets: Vec<TargetType>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[TargetType] {
        &self.targets
    }

    /// The target named by `ty` as written at its position, if any.
    ///
    /// Program types with the same name shadow the external type.
    fn matching(&self, ctx: &Context<'_>, unit: usize, ty: &TypeRef) -> Option<&TargetType> {
        if ty.keyword || ty.pointer || ty.is_tuple() || ty.is_array() || ty.segments.is_empty() {
            return None;
        }
        let at = ty.range.start;
        if ctx.symbols.resolve_type(ctx.program, unit, at, ty).is_some() {
            return None;
        }
        let candidates = candidates(ctx, unit, at, ty);
        self.targets
            .iter()
            .find(|t| candidates.iter().any(|c| *c == t.name))
    }
}

/// Fully qualified names `ty` may denote at token `at`.
fn candidates(ctx: &Context<'_>, unit: usize, at: usize, ty: &TypeRef) -> Vec<String> {
    let written = ty.qualified_name();
    let mut out = vec![written.clone()];
    if ty.alias.is_some() {
        return out;
    }
    let Some(tree) = ctx.program.unit(unit).map(|u| u.tree()) else {
        return out;
    };

    let local = tree
        .usings
        .iter()
        .filter(|u| u.namespace.is_none_or(|ns| tree.namespaces[ns].range.contains(at)))
        .map(|u| (tree, u));
    let global = ctx
        .program
        .units()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != unit)
        .flat_map(|(_, other)| {
            let other = other.tree();
            other.usings.iter().filter(|u| u.is_global).map(move |u| (other, u))
        });
    let scope: Vec<(&SyntaxTree, &UsingDirective)> = local.chain(global).collect();

    let first = ty.segments[0].name.as_str();
    let rest = &written[first.len()..];
    for (owner, using) in scope {
        if using.is_static {
            continue;
        }
        match using.alias {
            Some(alias) if owner.ident(alias) == Some(first) => {
                out.push(format!("{}{rest}", using.target_name));
            }
            Some(_) => {}
            None => out.push(format!("{}.{written}", using.target_name)),
        }
    }

    let enclosing = tree.namespace_name_at(at);
    let mut prefix = String::new();
    for part in enclosing.split('.').filter(|p| !p.is_empty()) {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(part);
        out.push(format!("{prefix}.{written}"));
    }
    out
}

impl Rewriter for TypeReferenceRewriter {
    fn kind(&self) -> RewriteKind {
        RewriteKind::TypeReference
    }

    fn plan_unit(&self, ctx: &Context<'_>, unit: usize, session: &mut Session) -> Result<EditPlan, RewriteError> {
        let mut plan = EditPlan::new(unit);
        let Some(source) = ctx.program.unit(unit) else {
            return Ok(plan);
        };
        if self.targets.is_empty() {
            return Ok(plan);
        }
        let tree = source.tree();
        let generated = session.namespace();
        let loader = HelperRole::TypeLoader.reference(session);

        let mut edits: Vec<SourceEdit> = Vec::new();
        let mut loosened: HashMap<SymbolId, &TargetType> = HashMap::new();
        // Initializer ranges of loosened locals, with the target they build.
        let mut initializers: HashMap<TokenRange, &TargetType> = HashMap::new();
        let mut retyped = HashSet::new();

        for (index, local) in tree.locals.iter().enumerate() {
            if !matches!(local.kind, LocalKind::Variable | LocalKind::Using)
                || tree.namespace_name_at(local.name_token) == generated
            {
                continue;
            }
            let (target, type_token) = match &local.type_ref {
                Some(ty) => match self.matching(ctx, unit, ty) {
                    Some(target) => (target, Some(ty.range)),
                    None => continue,
                },
                None => {
                    // `var x = new Target(..)`
                    let built = local
                        .init
                        .and_then(|init| tree.creations.iter().find(|c| c.range == init))
                        .and_then(|c| c.type_ref.as_ref())
                        .and_then(|ty| self.matching(ctx, unit, ty));
                    match built {
                        Some(target) => {
                            let var = local.name_token.checked_sub(1).filter(|&t| tree.ident(t) == Some("var"));
                            (target, var.map(|t| TokenRange::new(t, t + 1)))
                        }
                        None => continue,
                    }
                }
            };
            let Some(id) = ctx.symbols.local_symbol(unit, index) else {
                continue;
            };
            loosened.insert(id, target);
            if let Some(init) = local.init {
                initializers.insert(init, target);
            }
            let Some(range) = type_token else {
                continue;
            };
            let replacement = if target.disposable {
                DISPOSABLE
            } else if local.init.is_some() {
                "var"
            } else {
                "object"
            };
            if retyped.insert(range) && tree.slice(range) != replacement {
                edits.push(SourceEdit::replace(tree.span(range), replacement));
            }
        }

        if !loosened.is_empty() {
            for token in 0..tree.tokens.len() {
                if tree.ident(token).is_none()
                    || tree.is_member_access_name(token)
                    || !(tree.is_punct(token + 1, ".") || tree.is_punct(token + 1, "?."))
                {
                    continue;
                }
                let Binding::Symbol(id) = ctx.binder.bind(unit, token) else {
                    continue;
                };
                let Some(target) = loosened.get(&id) else {
                    continue;
                };
                if target.disposable && tree.ident(token + 2) == Some("Dispose") {
                    continue;
                }
                let name = tree.token_text(token);
                edits.push(SourceEdit::replace(tree.tokens[token].span, format!("((dynamic){name})")));
            }
        }

        let mut creations: Vec<_> = tree
            .creations
            .iter()
            .filter(|c| !c.array && c.init.is_none() && c.args.is_some())
            .filter(|c| tree.namespace_name_at(c.new_token) != generated)
            // The runtime binds arguments by position only.
            .filter(|c| c.args.is_some_and(|args| !has_named_args(tree, args)))
            .filter_map(|c| {
                let ty = c.type_ref.as_ref()?;
                Some((c, ty, self.matching(ctx, unit, ty)?))
            })
            .collect();
        // Inner creations first so an outer one carries their replacements.
        creations.sort_by_key(|(c, _, _)| tree.span(c.range).len());

        for (creation, ty, target) in creations {
            let Some(args) = creation.args else {
                continue;
            };
            let span = tree.span(creation.range);
            let values: Vec<String> = split_args(tree, args)
                .into_iter()
                .map(|piece| render_span(&tree.text, tree.span(piece), &edits))
                .collect();
            let array = if values.is_empty() {
                "new object[0]".to_string()
            } else {
                format!("new object[] {{ {} }}", values.join(", "))
            };
            let load = format!(
                "{loader}.InitializeTypeWithArgs({loader}.GetTypeFromString({}), {array})",
                quote_literal(&target.name)
            );
            let replacement = match initializers.get(&creation.range) {
                Some(local) if local.disposable => format!("({DISPOSABLE}){load}"),
                Some(_) => load,
                None => format!("(({}){load})", tree.type_text(ty)),
            };
            debug!("{}: constructing {} indirectly", source.path(), target.name);
            edits.retain(|e| !span.encloses(&e.span));
            edits.push(SourceEdit::replace(span, replacement));
        }

        for edit in edits {
            plan.push(edit);
        }
        Ok(plan.needs(HelperRole::TypeLoader))
    }
}

fn has_named_args(tree: &SyntaxTree, args: TokenRange) -> bool {
    split_args(tree, args)
        .iter()
        .any(|piece| tree.ident(piece.start).is_some() && tree.is_punct(piece.start + 1, ":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorConfig, NameGenerator};
    use crate::pass::{run, ConflictPolicy};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shroud_core::Program;

    fn hide(src: &str) -> (Program, Session) {
        let mut program = Program::from_sources("App", [("a.cs", src)]).unwrap();
        let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(13)).unwrap();
        let mut session = Session::for_program(&program, generator).unwrap();
        let report = run(&mut program, &TypeReferenceRewriter::default(), &mut session, ConflictPolicy::Abort).unwrap();
        assert_eq!(report.skipped(), 0);
        (program, session)
    }

    const ZIP: &str = r#"using System.IO;
using System.IO.Compression;

class Zip
{
    void Pack(Stream input)
    {
        GZipStream gz = new GZipStream(input, CompressionMode.Compress);
        gz.Flush();
        gz.Dispose();
        var other = new GZipStream(input, CompressionMode.Decompress);
        Use(new GZipStream(input, CompressionLevel.Fastest));
    }

    void Use(Stream s) {}
}
"#;

    #[test]
    fn locals_are_loosened_and_constructed_indirectly() {
        let (program, session) = hide(ZIP);
        let text = program.units()[0].text();
        let loader = format!("global::{}.IndirectObjectLoader", session.namespace());
        let lookup = format!("{loader}.GetTypeFromString(\"System.IO.Compression.GZipStream\")");

        assert!(!text.contains("new GZipStream"));
        assert!(text.contains(&format!(
            "global::System.IDisposable gz = (global::System.IDisposable){loader}.InitializeTypeWithArgs({lookup}, new object[] {{ input, CompressionMode.Compress }});"
        )));
        assert!(text.contains(&format!(
            "global::System.IDisposable other = (global::System.IDisposable){loader}.InitializeTypeWithArgs({lookup}, new object[] {{ input, CompressionMode.Decompress }});"
        )));
        assert!(text.contains("((dynamic)gz).Flush();"));
        assert!(text.contains("gz.Dispose();"));
        assert!(session.is_injected(HelperRole::TypeLoader));
    }

    #[test]
    fn other_creations_are_cast_back() {
        let (program, session) = hide(ZIP);
        let text = program.units()[0].text();
        assert!(text.contains(&format!(
            "Use(((GZipStream)global::{}.IndirectObjectLoader.InitializeTypeWithArgs(",
            session.namespace()
        )));
    }

    #[test]
    fn named_arguments_are_not_packed() {
        let src = "using System.IO;\nusing System.IO.Compression;\nclass A { void M(Stream s) { Keep(new GZipStream(mode: CompressionMode.Compress, stream: s)); } void Keep(Stream s) {} }";
        let (program, _) = hide(src);
        let text = program.units()[0].text();
        assert!(text.contains("new GZipStream(mode: CompressionMode.Compress, stream: s)"));
        assert!(!text.contains("InitializeTypeWithArgs"));
    }

    #[test]
    fn program_types_shadow_the_target() {
        let src = "using System.IO.Compression;\nclass GZipStream {}\nclass A { void M() { GZipStream g = new GZipStream(); } }";
        let (program, session) = hide(src);
        assert_eq!(program.units()[0].text(), src);
        assert!(!session.is_injected(HelperRole::TypeLoader));
    }

    #[test]
    fn unimported_names_do_not_match() {
        let src = "using System.IO;\nclass A { void M() { GZipStream g = null; } }";
        let (program, _) = hide(src);
        assert_eq!(program.units()[0].text(), src);
    }

    #[test]
    fn qualified_and_nested_creations() {
        let rewriter = TypeReferenceRewriter::new(vec![
            TargetType::default(),
            TargetType::new("System.IO.MemoryStream", true),
        ]);
        let src = "class A { void M() { var z = new System.IO.Compression.GZipStream(new System.IO.MemoryStream(), System.IO.Compression.CompressionMode.Compress); } }";
        let mut program = Program::from_sources("App", [("a.cs", src)]).unwrap();
        let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(2)).unwrap();
        let mut session = Session::for_program(&program, generator).unwrap();
        run(&mut program, &rewriter, &mut session, ConflictPolicy::Abort).unwrap();

        let text = program.units()[0].text();
        assert!(!text.contains("new System.IO"));
        assert!(text.contains("GetTypeFromString(\"System.IO.MemoryStream\")"));
        assert!(text.contains("((System.IO.MemoryStream)global::"));
        assert!(text.contains("class A { void M() { global::System.IDisposable z = (global::System.IDisposable)"));
    }
}
