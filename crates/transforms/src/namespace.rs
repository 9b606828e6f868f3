//! Collapses every user namespace into the run's generated namespace.
//!
//! Outermost declarations are renamed, nested declarations are flattened
//! into their outermost ancestor (their `using` directives move up with
//! them), and every directive or qualified name that starts with a user
//! namespace has that prefix replaced.

use crate::session::Session;
use crate::{Context, EditPlan, RewriteKind, Rewriter};
use indexmap::IndexMap;
use shroud_core::syntax::UsingDirective;
use shroud_core::{Binding, SourceEdit, Span, SyntaxTree};
use shroud_utils::errors::RewriteError;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceCollapser;

impl NamespaceCollapser {
    pub fn new() -> Self {
        Self
    }
}

/// Roots of namespaces the runtime and platform SDKs own. Declarations under
/// them extend those namespaces (attribute polyfills, for instance) and keep
/// their names.
const FRAMEWORK_ROOTS: &[&str] = &["System", "Microsoft", "Windows"];

fn is_owned(full_name: &str, generated: &str) -> bool {
    let root = full_name.split('.').next().unwrap_or_default();
    full_name != generated && !FRAMEWORK_ROOTS.contains(&root)
}

/// Every owned namespace name and each of its dotted prefixes.
fn user_namespaces(ctx: &Context<'_>, generated: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    for unit in ctx.program.units() {
        for decl in &unit.tree().namespaces {
            if !is_owned(&decl.full_name, generated) {
                continue;
            }
            let mut prefix = String::new();
            for part in decl.full_name.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                names.insert(prefix.clone());
            }
        }
    }
    names
}

fn outermost(tree: &SyntaxTree, mut decl: usize) -> usize {
    while let Some(parent) = tree.namespaces[decl].parent {
        decl = parent;
    }
    decl
}

fn token_span(tree: &SyntaxTree, first: usize, last: usize) -> Span {
    Span::new(tree.tokens[first].span.start, tree.tokens[last].span.end)
}

/// Span of the longest user-namespace prefix of a directive's target, and
/// that prefix.
fn target_prefix(tree: &SyntaxTree, using: &UsingDirective, user: &HashSet<String>) -> Option<(Span, String)> {
    let mut index = using.target.start;
    if tree.ident(index) == Some("global") && tree.is_punct(index + 1, "::") {
        index += 2;
    }
    let first = index;
    let mut name = tree.ident(index)?.to_string();
    let mut best = user.contains(&name).then_some(index);
    let mut best_name = name.clone();
    while index + 2 < using.target.end && tree.is_punct(index + 1, ".") {
        let Some(next) = tree.ident(index + 2) else {
            break;
        };
        index += 2;
        name = format!("{name}.{next}");
        if user.contains(&name) {
            best = Some(index);
            best_name = name.clone();
        }
    }
    best.map(|last| (token_span(tree, first, last), best_name))
}

impl Rewriter for NamespaceCollapser {
    fn kind(&self) -> RewriteKind {
        RewriteKind::NamespaceCollapse
    }

    fn plan_program(&self, ctx: &Context<'_>, session: &mut Session) -> Result<Vec<EditPlan>, RewriteError> {
        let generated = session.namespace().to_string();
        let user = user_namespaces(ctx, &generated);
        let mut plans = Vec::with_capacity(ctx.program.len());

        for (unit, source) in ctx.program.units().iter().enumerate() {
            let tree = source.tree();
            let mut plan = EditPlan::new(unit);
            let mut claimed: HashSet<usize> = HashSet::new();

            for decl in &tree.namespaces {
                claimed.extend(decl.name_tokens.iter().copied());
                if !is_owned(&decl.full_name, &generated) {
                    continue;
                }
                let (Some(&first), Some(&last)) = (decl.name_tokens.first(), decl.name_tokens.last()) else {
                    continue;
                };
                if decl.parent.is_none() {
                    let name = session.namespace_for(&decl.full_name).to_string();
                    plan.push(SourceEdit::replace(token_span(tree, first, last), name));
                    continue;
                }
                let open = last + 1;
                let Some(close) = tree.is_punct(open, "{").then(|| tree.pair(open)).flatten() else {
                    continue;
                };
                session.namespace_for(&decl.full_name);
                plan.push(SourceEdit::delete(token_span(tree, decl.range.start, open)));
                plan.push(SourceEdit::delete(tree.tokens[close].span));
            }

            let mut hoisted: IndexMap<usize, Vec<String>> = IndexMap::new();
            for using in &tree.usings {
                claimed.extend(using.range.start..using.range.end);
                let prefix = target_prefix(tree, using, &user);
                let replacement = prefix
                    .as_ref()
                    .map(|(span, name)| (*span, session.namespace_for(name).to_string()));
                let nested = using.namespace.filter(|&ns| {
                    tree.namespaces[ns].parent.is_some()
                        && is_owned(&tree.namespaces[ns].full_name, &generated)
                });
                match nested {
                    Some(ns) => {
                        let whole = tree.span(using.range);
                        let mut text = tree.slice(using.range).to_string();
                        if let Some((span, name)) = replacement {
                            text.replace_range(span.start - whole.start..span.end - whole.start, &name);
                        }
                        plan.push(SourceEdit::delete(whole));
                        hoisted.entry(outermost(tree, ns)).or_default().push(text);
                    }
                    None => {
                        if let Some((span, name)) = replacement {
                            plan.push(SourceEdit::replace(span, name));
                        }
                    }
                }
            }
            for (outer, lines) in hoisted {
                let Some(&last) = tree.namespaces[outer].name_tokens.last() else {
                    continue;
                };
                let anchor = last + 1;
                if tree.is_punct(anchor, "{") || tree.is_punct(anchor, ";") {
                    plan.push(SourceEdit::insert(
                        tree.tokens[anchor].span.end,
                        format!("\n{}", lines.join("\n")),
                    ));
                }
            }

            let mut token = 0;
            while token < tree.tokens.len() {
                let current = token;
                token += 1;
                if claimed.contains(&current)
                    || tree.ident(current).is_none()
                    || tree.is_member_access_name(current)
                    || tree.namespace_name_at(current) == generated
                {
                    continue;
                }
                if current >= 2 && tree.is_punct(current - 1, "::") && tree.ident(current - 2) != Some("global") {
                    continue;
                }
                let Binding::Namespace(id) = ctx.binder.bind(unit, current) else {
                    continue;
                };
                let mut name = ctx.symbols.get(id).display.clone();
                let mut best = user.contains(&name).then(|| (current, name.clone()));
                let mut end = current;
                while tree.is_punct(end + 1, ".") {
                    let Some(next) = tree.ident(end + 2) else {
                        break;
                    };
                    end += 2;
                    name = format!("{name}.{next}");
                    if user.contains(&name) {
                        best = Some((end, name.clone()));
                    }
                }
                let Some((last, full)) = best else {
                    continue;
                };
                let replacement = session.namespace_for(&full).to_string();
                plan.push(SourceEdit::replace(token_span(tree, current, last), replacement));
                token = last + 1;
            }

            plans.push(plan);
        }
        Ok(plans)
    }
}
