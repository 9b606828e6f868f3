//! Statement and expression scan over the concrete syntax tree.
//!
//! Records what the rewriters and the binder need from code bodies: local
//! declarations with their scopes, object creations, and the ranges that
//! must stay compile-time constants.

use tree_sitter::Node;

use crate::cst;
use crate::parser::Parser;
use crate::syntax::{Creation, LocalDecl, LocalKind, TokenRange};
use crate::types::TypeRef;

/// Nodes that bound the scope of a declared local.
const BLOCKS: &[&str] = &[
    "block",
    "switch_body",
    "switch_block",
    "arrow_expression_clause",
    "compilation_unit",
];

/// Pattern variables are scoped to their arm or section when inside one.
const PATTERN_SCOPES: &[&str] = &[
    "switch_expression_arm",
    "switch_section",
    "block",
    "switch_body",
    "arrow_expression_clause",
    "compilation_unit",
];

const QUERY_CLAUSES: &[&str] = &[
    "from_clause",
    "join_clause",
    "let_clause",
    "query_continuation",
    "join_into_clause",
];

impl Parser {
    pub(crate) fn scan_bodies(&mut self, root: Node<'_>) {
        for node in cst::descendants(root) {
            match node.kind() {
                "local_declaration_statement" => self.local_declaration(node),
                "using_statement" | "fixed_statement" => {
                    self.header_declaration(node, LocalKind::Using);
                }
                "for_statement" => self.header_declaration(node, LocalKind::Variable),
                "foreach_statement" => self.foreach(node),
                "catch_declaration" => self.catch_declaration(node),
                "declaration_expression" => self.declaration_expression(node),
                "declaration_pattern" | "var_pattern" | "recursive_pattern" => {
                    self.pattern_designation(node);
                }
                "is_pattern_expression" | "is_expression" => self.is_pattern(node),
                "switch_section" | "case_switch_label" | "case_pattern_switch_label" => {
                    self.case_labels(node);
                }
                "switch_expression" => self.switch_arms(node),
                "lambda_expression" | "anonymous_method_expression" => self.lambda(node),
                "local_function_statement" => self.local_function(node),
                kind if QUERY_CLAUSES.contains(&kind) => self.query_variable(node),
                "object_creation_expression"
                | "implicit_object_creation_expression"
                | "anonymous_object_creation_expression"
                | "array_creation_expression" => self.creation(node),
                _ => {}
            }
        }
    }

    fn push_local(
        &mut self,
        kind: LocalKind,
        name_token: usize,
        type_ref: Option<TypeRef>,
        init: Option<TokenRange>,
        scope: TokenRange,
    ) -> Option<usize> {
        let name = self.ident(name_token)?.to_string();
        if name == "_" {
            return None;
        }
        let type_ref = type_ref.filter(|t| !t.is_var());
        self.tree.locals.push(LocalDecl {
            kind,
            name_token,
            name,
            type_ref,
            init,
            scope,
        });
        Some(self.tree.locals.len() - 1)
    }

    /// Token index one past the nearest enclosing `kinds` node.
    fn scope_end(&self, node: Node<'_>, kinds: &[&str]) -> usize {
        cst::ancestor(node, kinds).map_or(self.tree.tokens.len(), |a| self.range(a).end)
    }

    /// Declares each `variable_declarator` of `declaration`, scoped to `end`.
    fn declarators(&mut self, declaration: Node<'_>, kind: LocalKind, end: usize) {
        let type_ref = self.declared_type(declaration);
        for declarator in cst::named_children(declaration) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let init = self.initializer(declarator);
            if let (LocalKind::Const, Some(init)) = (kind, init) {
                self.tree.constant_ranges.push(init);
            }
            if let Some(name) = cst::field(declarator, &["name"])
                .or_else(|| cst::child_of_kind(declarator, &["identifier"]))
            {
                let name_token = self.token(name);
                let scope = TokenRange::new(name_token, end);
                self.push_local(kind, name_token, type_ref.clone(), init, scope);
                continue;
            }
            // `var (a, b) = ...`
            if let Some(tuple) = cst::child_of_kind(declarator, &["tuple_pattern"]) {
                let start = self.token(tuple);
                self.designations(tuple, LocalKind::Deconstruction, TokenRange::new(start, end));
            }
        }
    }

    /// Every identifier designated under `node`.
    fn designations(&mut self, node: Node<'_>, kind: LocalKind, scope: TokenRange) {
        for found in cst::descendants(node) {
            if found.kind() == "identifier" {
                let name_token = self.token(found);
                self.push_local(kind, name_token, None, None, scope);
            }
        }
    }

    fn local_declaration(&mut self, node: Node<'_>) {
        let children = cst::children(node);
        let kind = if children.iter().any(|c| self.tree.node_text(*c) == "const") {
            LocalKind::Const
        } else if children.iter().any(|c| c.kind() == "using") {
            LocalKind::Using
        } else {
            LocalKind::Variable
        };
        let Some(declaration) = cst::child_of_kind(node, &["variable_declaration"]) else {
            return;
        };
        let end = self.scope_end(node, BLOCKS);
        self.declarators(declaration, kind, end);
    }

    /// `using (...)`, `fixed (...)` and `for (...)` headers.
    fn header_declaration(&mut self, node: Node<'_>, kind: LocalKind) {
        let declaration = cst::field(node, &["initializer"])
            .filter(|n| n.kind() == "variable_declaration")
            .or_else(|| cst::child_of_kind(node, &["variable_declaration"]));
        if let Some(declaration) = declaration {
            let end = self.range(node).end;
            self.declarators(declaration, kind, end);
        }
    }

    fn foreach(&mut self, node: Node<'_>) {
        let Some(left) = cst::field(node, &["left"]) else {
            return;
        };
        let end = self.range(node).end;
        let init = cst::field(node, &["right"]).map(|r| self.range(r));
        match left.kind() {
            "identifier" => {
                let type_ref = cst::field(node, &["type"]).and_then(|t| self.type_of(t));
                let name_token = self.token(left);
                let scope = TokenRange::new(name_token, end);
                self.push_local(LocalKind::ForEach, name_token, type_ref, init, scope);
            }
            // `foreach ((var a, var b) in ...)` is handled by its declarations.
            "declaration_expression" => {}
            _ => {
                let start = self.token(left);
                self.designations(left, LocalKind::Deconstruction, TokenRange::new(start, end));
            }
        }
    }

    fn catch_declaration(&mut self, node: Node<'_>) {
        let Some(name) = cst::field(node, &["name"]) else {
            return;
        };
        let type_ref = cst::field(node, &["type"]).and_then(|t| self.type_of(t));
        let end = node.parent().map_or(self.tree.tokens.len(), |c| self.range(c).end);
        let name_token = self.token(name);
        let scope = TokenRange::new(name_token, end);
        self.push_local(LocalKind::Catch, name_token, type_ref, None, scope);
    }

    /// `out int x` arguments and `(var a, var b) = ...` deconstructions.
    fn declaration_expression(&mut self, node: Node<'_>) {
        let is_out = node.parent().is_some_and(|p| {
            p.kind() == "argument" && cst::children(p).iter().any(|c| c.kind() == "out")
        });
        let kind = if is_out { LocalKind::Out } else { LocalKind::Deconstruction };
        let type_ref = cst::field(node, &["type"]).and_then(|t| self.type_of(t));
        let end = self.scope_end(node, BLOCKS);
        let Some(name) = cst::field(node, &["name"]) else {
            return;
        };
        let start = self.token(name);
        if name.kind() == "identifier" {
            self.push_local(kind, start, type_ref, None, TokenRange::new(start, end));
        } else {
            self.designations(name, LocalKind::Deconstruction, TokenRange::new(start, end));
        }
    }

    /// `T name` and `var name` designations inside a pattern.
    fn pattern_designation(&mut self, node: Node<'_>) {
        let type_ref = if node.kind() == "declaration_pattern" {
            cst::field(node, &["type"]).and_then(|t| self.type_of(t))
        } else {
            None
        };
        let name = cst::field(node, &["name", "designation"]).or_else(|| {
            cst::named_children(node)
                .into_iter()
                .rev()
                .find(|c| c.kind() == "identifier")
        });
        // A lone identifier in a recursive pattern is its type.
        let name = name.filter(|n| {
            node.kind() != "recursive_pattern" || n.start_byte() > node.start_byte()
        });
        let Some(name) = name else {
            return;
        };
        let end = self.scope_end(node, PATTERN_SCOPES);
        let start = self.token(name);
        if name.kind() == "identifier" {
            let scope = TokenRange::new(start, end);
            self.push_local(LocalKind::Pattern, start, type_ref, None, scope);
        } else {
            self.designations(name, LocalKind::Pattern, TokenRange::new(start, end));
        }
    }

    fn is_pattern(&mut self, node: Node<'_>) {
        let children = cst::children(node);
        let Some(at) = children.iter().position(|c| c.kind() == "is") else {
            return;
        };
        let start = self.range(children[at]).end;
        let end = self.range(node).end;
        self.tree.constant_ranges.push(TokenRange::new(start, end));
    }

    /// The pattern after each `case` up to its `when` clause or colon.
    fn case_labels(&mut self, node: Node<'_>) {
        let children = cst::children(node);
        for (at, child) in children.iter().enumerate() {
            if child.kind() != "case" {
                continue;
            }
            let start = self.range(*child).end;
            let stop = children[at + 1..]
                .iter()
                .find(|c| matches!(c.kind(), ":" | "when_clause"))
                .map_or(start, |c| self.range(*c).start);
            self.tree.constant_ranges.push(TokenRange::new(start, stop));
        }
    }

    fn switch_arms(&mut self, node: Node<'_>) {
        let Some(open) = cst::child_of_kind(node, &["{"]) else {
            return;
        };
        let start = self.token(open);
        let end = self.range(node).end;
        self.tree.switch_expressions.push(TokenRange::new(start, end));
        for arm in cst::named_children(node) {
            if arm.kind() != "switch_expression_arm" {
                continue;
            }
            let pattern = cst::named_children(arm)
                .into_iter()
                .find(|c| c.kind() != "attribute_list");
            if let Some(pattern) = pattern {
                let range = self.range(pattern);
                self.tree.constant_ranges.push(range);
            }
        }
    }

    fn lambda(&mut self, node: Node<'_>) {
        let end = self.range(node).end;
        let params = cst::field(node, &["parameters"])
            .or_else(|| cst::child_of_kind(node, &["parameter_list"]))
            .or_else(|| {
                let children = cst::children(node);
                let arrow = children.iter().position(|c| c.kind() == "=>")?;
                children[..arrow].iter().rev().find(|c| c.is_named()).copied()
            });
        let Some(params) = params else {
            return;
        };
        let start = self.token(params);
        match params.kind() {
            "parameter_list" => {
                let scope = TokenRange::new(start, end);
                for part in self.parameter_parts(params) {
                    self.push_local(LocalKind::Lambda, part.name_token, part.type_ref, None, scope);
                }
            }
            "identifier" | "implicit_parameter" => {
                self.push_local(LocalKind::Lambda, start, None, None, TokenRange::new(start, end));
            }
            _ => {}
        }
    }

    fn local_function(&mut self, node: Node<'_>) {
        let Some(name) = cst::field(node, &["name"]) else {
            return;
        };
        let name_token = self.token(name);
        let type_ref = cst::field(node, &["type", "returns"]).and_then(|t| self.type_of(t));
        let block = cst::ancestor(node, BLOCKS).map_or(
            TokenRange::new(name_token, self.tree.tokens.len()),
            |b| self.range(b),
        );
        self.push_local(LocalKind::Function, name_token, type_ref, None, block);

        let list = cst::field(node, &["parameters"])
            .or_else(|| cst::child_of_kind(node, &["parameter_list"]));
        if let Some(list) = list {
            let scope = TokenRange::new(self.token(list), self.range(node).end);
            for part in self.parameter_parts(list) {
                self.push_local(LocalKind::FunctionParam, part.name_token, part.type_ref, None, scope);
            }
        }
    }

    fn query_variable(&mut self, node: Node<'_>) {
        let children = cst::children(node);
        let name = match node.kind() {
            "from_clause" | "join_clause" => children
                .iter()
                .position(|c| c.kind() == "in")
                .and_then(|at| at.checked_sub(1))
                .map(|at| {
                    let ty = at
                        .checked_sub(1)
                        .map(|t| children[t])
                        .filter(|t| t.is_named())
                        .and_then(|t| self.type_of(t));
                    (children[at], ty)
                }),
            "let_clause" => children
                .iter()
                .position(|c| c.kind() == "=")
                .and_then(|at| at.checked_sub(1))
                .map(|at| (children[at], None)),
            _ => children
                .iter()
                .position(|c| c.kind() == "into")
                .and_then(|at| children.get(at + 1))
                .map(|n| (*n, None)),
        };
        let Some((name, ty)) = name.filter(|(n, _)| n.kind() == "identifier") else {
            return;
        };
        // Range variables live until the end of the outermost query.
        let mut query = node;
        let mut current = node.parent();
        while let Some(parent) = current {
            if parent.kind() == "query_expression" {
                query = parent;
            }
            current = parent.parent();
        }
        let name_token = self.token(name);
        let end = self.range(query).end;
        let scope = TokenRange::new(name_token, end);
        self.push_local(LocalKind::Query, name_token, ty, None, scope);
    }

    fn creation(&mut self, node: Node<'_>) {
        let range = self.range(node);
        let new_token = range.start;
        let mut creation = Creation {
            new_token,
            type_ref: None,
            args: None,
            init: None,
            array: node.kind() == "array_creation_expression",
            range,
        };
        match node.kind() {
            "anonymous_object_creation_expression" => {
                creation.init = Some(TokenRange::new(new_token + 1, range.end));
            }
            "implicit_object_creation_expression" => {}
            _ => {
                let stop = cst::child_of_kind(node, &["argument_list", "initializer_expression"])
                    .map_or(range.end, |n| self.range(n).start);
                creation.type_ref = self.ty(new_token + 1, stop).map(|(ty, _)| ty);
                if creation.type_ref.as_ref().is_some_and(TypeRef::is_array) {
                    creation.array = true;
                }
            }
        }
        if !creation.array {
            creation.args = cst::child_of_kind(node, &["argument_list"]).map(|a| self.range(a));
        }
        if creation.init.is_none() {
            creation.init =
                cst::child_of_kind(node, &["initializer_expression"]).map(|i| self.range(i));
        }
        self.tree.creations.push(creation);
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::{LocalKind, SyntaxTree};

    fn locals(src: &str) -> Vec<(LocalKind, String, Option<String>)> {
        let tree = SyntaxTree::parse(src).unwrap();
        tree.locals
            .iter()
            .map(|l| {
                (
                    l.kind,
                    l.name.clone(),
                    l.type_ref.as_ref().map(|t| t.qualified_name()),
                )
            })
            .collect()
    }

    #[test]
    fn finds_statement_locals() {
        let src = r#"class C { void M() {
            var w = new Widget();
            int a = 1, b = 2;
            const string label = "x";
            foreach (var item in items) { }
            for (int i = 0; i < 3; i++) { }
            using var stream = Open();
            try { } catch (Exception ex) { }
        } }"#;
        let found = locals(src);
        let names: Vec<_> = found.iter().map(|(_, n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["w", "a", "b", "label", "item", "i", "stream", "ex"]);
        assert_eq!(found[1].2.as_deref(), Some("int"));
        assert_eq!(found[0].2, None);
        assert_eq!(found[3].0, LocalKind::Const);
        assert_eq!(found[4].0, LocalKind::ForEach);
        assert_eq!(found[7].0, LocalKind::Catch);
    }

    #[test]
    fn finds_expression_variables() {
        let src = r#"class C { void M(object o) {
            if (o is Widget w) { }
            Parse("1", out int parsed);
            Run(x => x + 1);
            Run((int y, string z) => y);
            var q = from n in nums where n > 0 select n;
        } }"#;
        let names: Vec<_> = locals(src).into_iter().map(|(k, n, _)| (k, n)).collect();
        let expected: Vec<_> = [
            (LocalKind::Pattern, "w"),
            (LocalKind::Out, "parsed"),
            (LocalKind::Lambda, "x"),
            (LocalKind::Lambda, "y"),
            (LocalKind::Lambda, "z"),
            (LocalKind::Variable, "q"),
            (LocalKind::Query, "n"),
        ]
        .into_iter()
        .map(|(k, n)| (k, n.to_string()))
        .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn records_creations() {
        let src = "class C { void M() { var z = new GZipStream(s, mode) { }; var a = new int[3]; Widget w = new(); } }";
        let tree = SyntaxTree::parse(src).unwrap();
        assert_eq!(tree.creations.len(), 3);
        let first = &tree.creations[0];
        assert_eq!(first.type_ref.as_ref().unwrap().simple_name(), "GZipStream");
        assert_eq!(tree.slice(first.args.unwrap()), "(s, mode)");
        assert!(first.init.is_some());
        assert!(tree.creations[1].array);
        assert!(tree.creations[2].type_ref.is_none());
    }

    #[test]
    fn switch_and_case_patterns_are_constant() {
        let src = r#"class C { string M(string s) {
            switch (s) { case "a": return "b"; }
            return s switch { "c" => "d", _ => "e" };
        } }"#;
        let tree = SyntaxTree::parse(src).unwrap();
        let constant = |lit: &str| {
            let i = tree
                .tokens
                .iter()
                .position(|t| t.text(&tree.text) == lit)
                .unwrap();
            tree.in_constant_context(i)
        };
        assert!(constant("\"a\""));
        assert!(!constant("\"b\""));
        assert!(constant("\"c\""));
        assert!(!constant("\"d\""));
        assert!(tree.locals.iter().all(|l| l.name != "_"));
    }

    #[test]
    fn local_scope_ends_with_block() {
        let src = "class C { void M() { { int a = 1; } a = 2; } }";
        let tree = SyntaxTree::parse(src).unwrap();
        let local = &tree.locals[0];
        let second_a = tree
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.text(&tree.text) == "a")
            .map(|(i, _)| i)
            .nth(1)
            .unwrap();
        assert!(!local.scope.contains(second_a));
    }
}
