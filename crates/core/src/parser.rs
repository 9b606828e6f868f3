//! Declaration-level parser.
//!
//! Builds a [`SyntaxTree`] from the tree-sitter C# grammar: compilation-unit
//! items, namespaces, types, members and parameters. Statement-level facts
//! are collected afterwards by the body scan in `body.rs`.

use tree_sitter::Node;

use crate::cst;
use crate::lexer::{self, Token, TokenKind};
use crate::syntax::{
    Attribute, AttributeList, Item, ItemKind, MemberDecl, MemberKind, NamespaceDecl,
    ParamDecl, ParamModifier, ParamOwner, SyntaxTree, TokenRange, TypeDecl, TypeKind,
    UsingDirective,
};
use crate::types::{parse_type, TypeRef};
use shroud_utils::errors::SyntaxError;

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "record_struct_declaration",
    "delegate_declaration",
];

pub(crate) fn parse(text: String) -> Result<SyntaxTree, SyntaxError> {
    let parsed = cst::parse(&text)?;
    let root = parsed.root_node();
    let tokens = lexer::leaves(&text, root);
    let pairs = pair_brackets(&text, &tokens)?;
    if let Some(error) = cst::first_error(&text, root) {
        return Err(error);
    }
    let count = tokens.len();
    let tree = SyntaxTree {
        text,
        tokens,
        pairs,
        items: Vec::new(),
        usings: Vec::new(),
        namespaces: Vec::new(),
        types: Vec::new(),
        members: Vec::new(),
        params: Vec::new(),
        locals: Vec::new(),
        creations: Vec::new(),
        attributes: Vec::new(),
        constant_ranges: Vec::new(),
        switch_expressions: Vec::new(),
        type_of_token: vec![None; count],
        member_of_token: vec![None; count],
        namespace_of_token: vec![None; count],
    };

    let mut parser = Parser { tree };
    parser.scope(cst::named_children(root), None, true);
    parser.scan_bodies(root);
    parser.fill_owners();
    Ok(parser.tree)
}

fn pair_brackets(text: &str, tokens: &[Token]) -> Result<Vec<Option<usize>>, SyntaxError> {
    let mut pairs = vec![None; tokens.len()];
    let mut stack: Vec<(usize, char)> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        let delimiter = match token.text(text) {
            "(" => Some(('(', true)),
            "[" => Some(('[', true)),
            "{" => Some(('{', true)),
            ")" => Some(('(', false)),
            "]" => Some(('[', false)),
            "}" => Some(('{', false)),
            _ => None,
        };
        let Some((open, is_open)) = delimiter else {
            continue;
        };
        if is_open {
            stack.push((i, open));
            continue;
        }
        match stack.pop() {
            Some((j, expected)) if expected == open => {
                pairs[i] = Some(j);
                pairs[j] = Some(i);
            }
            _ => {
                return Err(SyntaxError::Unbalanced {
                    offset: token.span.start,
                    delimiter: token.text(text).chars().next().unwrap_or(open),
                })
            }
        }
    }
    if let Some((j, open)) = stack.pop() {
        return Err(SyntaxError::Unclosed {
            offset: tokens[j].span.start,
            delimiter: open,
        });
    }
    Ok(pairs)
}

/// One parameter as written in a parameter list.
#[derive(Debug)]
pub(crate) struct ParamParts {
    pub(crate) range: TokenRange,
    pub(crate) name_token: usize,
    pub(crate) name: String,
    pub(crate) type_ref: Option<TypeRef>,
    pub(crate) modifiers: Vec<ParamModifier>,
    pub(crate) attributes: Vec<usize>,
    pub(crate) default: Option<TokenRange>,
}

pub(crate) struct Parser {
    pub(crate) tree: SyntaxTree,
}

impl Parser {
    pub(crate) fn p(&self, i: usize, punct: &str) -> bool {
        self.tree.is_punct(i, punct)
    }

    pub(crate) fn kw(&self, i: usize, word: &str) -> bool {
        self.tree.is_keyword(i, word)
    }

    pub(crate) fn ident(&self, i: usize) -> Option<&str> {
        self.tree.ident(i)
    }

    pub(crate) fn ident_is(&self, i: usize, word: &str) -> bool {
        self.tree
            .tokens
            .get(i)
            .is_some_and(|t| t.kind == TokenKind::Identifier && t.text(&self.tree.text) == word)
    }

    pub(crate) fn ty(&self, i: usize, end: usize) -> Option<(TypeRef, usize)> {
        parse_type(&self.tree.text, &self.tree.tokens, i, end)
    }

    pub(crate) fn range(&self, node: Node<'_>) -> TokenRange {
        self.tree.node_range(node)
    }

    /// Index of the first token of `node`.
    pub(crate) fn token(&self, node: Node<'_>) -> usize {
        self.tree.token_index(node.start_byte())
    }

    pub(crate) fn type_of(&self, node: Node<'_>) -> Option<TypeRef> {
        let node = match node.kind() {
            "ref_type" | "scoped_type" => cst::named_children(node).last().copied()?,
            _ => node,
        };
        let range = self.range(node);
        self.ty(range.start, range.end).map(|(ty, _)| ty)
    }

    /// Type of a `variable_declaration`.
    pub(crate) fn declared_type(&self, declaration: Node<'_>) -> Option<TypeRef> {
        cst::field(declaration, &["type"])
            .or_else(|| cst::named_children(declaration).first().copied())
            .and_then(|t| self.type_of(t))
    }

    /// Value after `=` in a declarator, enum member or parameter.
    pub(crate) fn initializer(&self, node: Node<'_>) -> Option<TokenRange> {
        let children = cst::children(node);
        let at = children
            .iter()
            .position(|c| c.kind() == "=" || c.kind() == "equals_value_clause")?;
        if children[at].kind() == "equals_value_clause" {
            let range = self.range(children[at]);
            return Some(TokenRange::new(range.start + 1, range.end));
        }
        children.get(at + 1).map(|value| self.range(*value))
    }

    fn push_item(&mut self, kind: ItemKind, range: TokenRange) {
        self.tree.items.push(Item { kind, range });
    }

    fn namespace_name(&self, ns: Option<usize>) -> String {
        ns.map(|n| self.tree.namespaces[n].full_name.clone())
            .unwrap_or_default()
    }

    /// Namespace or compilation-unit members.
    fn scope(&mut self, nodes: Vec<Node<'_>>, mut ns: Option<usize>, mut top: bool) {
        for node in nodes {
            let range = self.range(node);
            let item = match node.kind() {
                "extern_alias_directive" => Some(ItemKind::ExternAlias),
                "using_directive" => {
                    self.using_directive(range, ns);
                    Some(ItemKind::Using)
                }
                "global_attribute" => {
                    self.attribute_list(node);
                    Some(ItemKind::GlobalAttribute)
                }
                "namespace_declaration" => {
                    self.namespace_decl(node, ns);
                    Some(ItemKind::Namespace { file_scoped: false })
                }
                "file_scoped_namespace_declaration" => {
                    let index = self.namespace_decl(node, ns);
                    if top {
                        let range = self.tree.namespaces[index].range;
                        self.push_item(ItemKind::Namespace { file_scoped: true }, range);
                    }
                    // Everything after `namespace X;` belongs to it.
                    ns = Some(index);
                    top = false;
                    None
                }
                "global_statement" => Some(ItemKind::Other),
                kind if TYPE_DECLARATIONS.contains(&kind) => {
                    let namespace = self.namespace_name(ns);
                    self.type_decl(node, namespace, None);
                    Some(ItemKind::Type)
                }
                kind if kind.starts_with("preproc") => {
                    self.scope(cst::named_children(node), ns, top);
                    None
                }
                _ => None,
            };
            if let (true, Some(kind)) = (top, item) {
                self.push_item(kind, range);
            }
        }
    }

    fn using_directive(&mut self, range: TokenRange, ns: Option<usize>) {
        let mut j = range.start;
        let is_global = self.ident_is(j, "global");
        if is_global {
            j += 1;
        }
        j += 1;
        let is_static = self.kw(j, "static");
        if is_static {
            j += 1;
        }
        if self.kw(j, "unsafe") {
            j += 1;
        }
        let mut alias = None;
        if self.ident(j).is_some() && self.p(j + 1, "=") {
            alias = Some(j);
            j += 2;
        }
        let Some((target, next)) = self.ty(j, range.end) else {
            return;
        };
        self.tree.usings.push(UsingDirective {
            range,
            is_global,
            is_static,
            alias,
            target: TokenRange::new(j, next),
            target_name: target.qualified_name(),
            namespace: ns,
        });
    }

    fn namespace_decl(&mut self, node: Node<'_>, parent: Option<usize>) -> usize {
        let file_scoped = node.kind() == "file_scoped_namespace_declaration";
        let name_node = cst::field(node, &["name"]);
        let name_tokens: Vec<usize> = name_node
            .map(|n| {
                let range = self.range(n);
                (range.start..range.end)
                    .filter(|i| self.ident(*i).is_some())
                    .collect()
            })
            .unwrap_or_default();
        let name = name_tokens
            .iter()
            .filter_map(|t| self.ident(*t))
            .collect::<Vec<_>>()
            .join(".");
        let full_name = match parent {
            Some(p) => format!("{}.{name}", self.tree.namespaces[p].full_name),
            None => name.clone(),
        };
        let mut range = self.range(node);
        if file_scoped {
            range.end = self.tree.tokens.len();
        }
        let index = self.tree.namespaces.len();
        self.tree.namespaces.push(NamespaceDecl {
            range,
            name_tokens,
            name,
            full_name,
            file_scoped,
            parent,
        });

        let members = match cst::field(node, &["body"])
            .or_else(|| cst::child_of_kind(node, &["declaration_list"]))
        {
            Some(body) => cst::named_children(body),
            None => cst::named_children(node)
                .into_iter()
                .filter(|c| Some(*c) != name_node)
                .collect(),
        };
        self.scope(members, Some(index), false);
        index
    }

    fn attributes_of(&mut self, node: Node<'_>) -> Vec<usize> {
        let mut lists = Vec::new();
        for child in cst::named_children(node) {
            if child.kind() == "attribute_list" {
                lists.push(self.attribute_list(child));
            }
        }
        lists
    }

    /// `[target: A, B(args)]`, including assembly-level lists.
    fn attribute_list(&mut self, node: Node<'_>) -> usize {
        let range = self.range(node);
        let target = if node.kind() == "global_attribute" {
            Some(self.tree.token_text(range.start + 1).to_string())
        } else {
            cst::child_of_kind(node, &["attribute_target_specifier"])
                .map(|t| self.tree.token_text(self.token(t)).to_string())
        };
        let mut attributes = Vec::new();
        for attribute in cst::named_children(node) {
            if attribute.kind() != "attribute" {
                continue;
            }
            let name = cst::field(attribute, &["name"])
                .or_else(|| cst::named_children(attribute).first().copied())
                .and_then(|n| self.type_of(n));
            let Some(name) = name else {
                continue;
            };
            let args = cst::child_of_kind(attribute, &["attribute_argument_list"])
                .map(|a| self.range(a));
            if let Some(args) = args {
                self.tree.constant_ranges.push(args);
            }
            attributes.push(Attribute { name, args });
        }
        self.tree.attributes.push(AttributeList {
            range,
            target,
            attributes,
        });
        self.tree.attributes.len() - 1
    }

    fn modifiers_of(&self, node: Node<'_>) -> Vec<String> {
        cst::named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "modifier")
            .map(|c| self.tree.node_text(c).to_string())
            .collect()
    }

    /// Name tokens of a `type_parameter_list`.
    fn type_params(&self, list: Node<'_>) -> Vec<usize> {
        cst::named_children(list)
            .into_iter()
            .filter(|p| p.kind() == "type_parameter")
            .filter_map(|p| {
                cst::field(p, &["name"]).or_else(|| {
                    cst::named_children(p)
                        .into_iter()
                        .rev()
                        .find(|c| c.kind() == "identifier")
                })
            })
            .map(|n| self.token(n))
            .collect()
    }

    fn type_decl(&mut self, node: Node<'_>, namespace: String, parent: Option<usize>) {
        let children = cst::children(node);
        let kind = match node.kind() {
            "class_declaration" => TypeKind::Class,
            "struct_declaration" => TypeKind::Struct,
            "interface_declaration" => TypeKind::Interface,
            "enum_declaration" => TypeKind::Enum,
            "delegate_declaration" => TypeKind::Delegate,
            "record_struct_declaration" => TypeKind::RecordStruct,
            _ if children.iter().any(|c| c.kind() == "struct") => TypeKind::RecordStruct,
            _ => TypeKind::Record,
        };
        let Some(name_node) = cst::field(node, &["name"]) else {
            return;
        };
        let name_token = self.token(name_node);
        let Some(name) = self.ident(name_token).map(str::to_string) else {
            return;
        };
        let range = self.range(node);
        let attributes = self.attributes_of(node);
        let modifiers = self.modifiers_of(node);
        let type_params = cst::child_of_kind(node, &["type_parameter_list"])
            .map(|l| self.type_params(l))
            .unwrap_or_default();
        let return_type = if kind == TypeKind::Delegate {
            cst::field(node, &["type", "returns"]).and_then(|t| self.type_of(t))
        } else {
            None
        };

        let index = self.tree.types.len();
        self.tree.types.push(TypeDecl {
            kind,
            range,
            name_token,
            name,
            type_params,
            modifiers,
            bases: Vec::new(),
            attributes,
            parent,
            namespace: namespace.clone(),
            body: None,
            return_type,
            params: TokenRange::default(),
        });

        // Primary constructor or delegate signature.
        if let Some(list) = cst::child_of_kind(node, &["parameter_list"]) {
            let params = self.params(list, ParamOwner::Type(index));
            self.tree.types[index].params = params;
        }
        if let Some(list) = cst::child_of_kind(node, &["base_list"]) {
            for base in cst::named_children(list) {
                let ty = match base.kind() {
                    "argument_list" => None,
                    "primary_constructor_base_type" => cst::field(base, &["type"])
                        .or_else(|| cst::named_children(base).first().copied())
                        .and_then(|t| self.type_of(t)),
                    _ => self.type_of(base),
                };
                if let Some(ty) = ty {
                    self.tree.types[index].bases.push(ty);
                }
            }
        }
        let body = cst::field(node, &["body"]).or_else(|| {
            cst::child_of_kind(node, &["declaration_list", "enum_member_declaration_list"])
        });
        if let Some(body) = body {
            self.tree.types[index].body = Some(self.range(body));
            if kind == TypeKind::Enum {
                self.enum_members(body, index);
            } else {
                self.type_body(cst::named_children(body), index, &namespace);
            }
        }
    }

    fn enum_members(&mut self, body: Node<'_>, owner: usize) {
        for member in cst::named_children(body) {
            if member.kind() != "enum_member_declaration" {
                continue;
            }
            let Some(name_node) = cst::field(member, &["name"])
                .or_else(|| cst::child_of_kind(member, &["identifier"]))
            else {
                continue;
            };
            let name_token = self.token(name_node);
            let name = self.ident(name_token).unwrap_or_default().to_string();
            let range = self.range(member);
            let attributes = self.attributes_of(member);
            let value = self.initializer(member);
            if let Some(value) = value {
                self.tree.constant_ranges.push(value);
            }
            self.tree.members.push(MemberDecl {
                kind: MemberKind::EnumMember,
                owner,
                range,
                name_token: Some(name_token),
                name,
                type_ref: None,
                modifiers: Vec::new(),
                explicit_interface: None,
                type_params: Vec::new(),
                attributes,
                params: TokenRange::default(),
                param_list: None,
                body: value,
            });
        }
    }

    fn type_body(&mut self, nodes: Vec<Node<'_>>, owner: usize, namespace: &str) {
        for node in nodes {
            let kind = match node.kind() {
                kind if TYPE_DECLARATIONS.contains(&kind) => {
                    self.type_decl(node, namespace.to_string(), Some(owner));
                    continue;
                }
                kind if kind.starts_with("preproc") => {
                    self.type_body(cst::named_children(node), owner, namespace);
                    continue;
                }
                "field_declaration" => {
                    self.fields(node, MemberKind::Field, owner);
                    continue;
                }
                "event_field_declaration" => {
                    self.fields(node, MemberKind::Event, owner);
                    continue;
                }
                "method_declaration" => MemberKind::Method,
                "constructor_declaration" => MemberKind::Constructor,
                "destructor_declaration" => MemberKind::Destructor,
                "operator_declaration" => MemberKind::Operator,
                "conversion_operator_declaration" => MemberKind::Conversion,
                "property_declaration" => MemberKind::Property,
                "indexer_declaration" => MemberKind::Indexer,
                "event_declaration" => MemberKind::Event,
                _ => continue,
            };
            self.member(node, kind, owner);
        }
    }

    /// Symbol after the `operator` keyword, e.g. `+` or `true`.
    fn operator_symbol(&self, range: TokenRange) -> String {
        let Some(mut k) = (range.start..range.end).find(|i| self.kw(*i, "operator")) else {
            return String::new();
        };
        k += 1;
        if self.kw(k, "checked") {
            k += 1;
        }
        self.tree.token_text(k).to_string()
    }

    fn member(&mut self, node: Node<'_>, kind: MemberKind, owner: usize) {
        let range = self.range(node);
        let attributes = self.attributes_of(node);
        let modifiers = self.modifiers_of(node);
        let mut decl = MemberDecl {
            kind,
            owner,
            range,
            name_token: None,
            name: String::new(),
            type_ref: None,
            modifiers,
            explicit_interface: None,
            type_params: Vec::new(),
            attributes,
            params: TokenRange::default(),
            param_list: None,
            body: None,
        };
        match kind {
            MemberKind::Operator => decl.name = format!("op_{}", self.operator_symbol(range)),
            MemberKind::Conversion => {
                let direction = (range.start..range.end)
                    .find(|i| self.kw(*i, "implicit") || self.kw(*i, "explicit"))
                    .map_or("explicit", |i| self.tree.token_text(i));
                decl.name = format!("op_{direction}");
            }
            MemberKind::Indexer => decl.name = "this[]".to_string(),
            _ => {
                let Some(name) = cst::field(node, &["name"]) else {
                    return;
                };
                let token = self.token(name);
                decl.name_token = Some(token);
                decl.name = self.tree.ident(token).unwrap_or_default().to_string();
            }
        }
        if !matches!(kind, MemberKind::Constructor | MemberKind::Destructor) {
            decl.type_ref = cst::field(node, &["type", "returns"]).and_then(|t| self.type_of(t));
        }
        if let Some(iface) = cst::child_of_kind(node, &["explicit_interface_specifier"]) {
            let iface = self.range(iface);
            let end = if self.p(iface.end.saturating_sub(1), ".") {
                iface.end - 1
            } else {
                iface.end
            };
            decl.explicit_interface = self.ty(iface.start, end).map(|(ty, _)| ty);
        }
        if let Some(list) = cst::child_of_kind(node, &["type_parameter_list"]) {
            decl.type_params = self.type_params(list);
        }
        let list = cst::field(node, &["parameters"])
            .or_else(|| cst::child_of_kind(node, &["parameter_list", "bracketed_parameter_list"]));
        if let Some(list) = list {
            let index = self.tree.members.len();
            decl.params = self.params(list, ParamOwner::Member(index));
            decl.param_list = Some(self.range(list));
        }
        let body = cst::child_of_kind(
            node,
            &["constructor_initializer", "block", "arrow_expression_clause", "accessor_list"],
        );
        decl.body = body.map(|b| TokenRange::new(self.range(b).start, range.end));
        self.tree.members.push(decl);
    }

    /// Field and event-field declarations: one member per declarator.
    fn fields(&mut self, node: Node<'_>, kind: MemberKind, owner: usize) {
        let range = self.range(node);
        let attributes = self.attributes_of(node);
        let modifiers = self.modifiers_of(node);
        let kind = if kind == MemberKind::Field && modifiers.iter().any(|m| m == "const") {
            MemberKind::Const
        } else {
            kind
        };
        let Some(declaration) = cst::child_of_kind(node, &["variable_declaration"]) else {
            return;
        };
        let type_ref = self.declared_type(declaration);
        for declarator in cst::named_children(declaration) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name) = cst::field(declarator, &["name"])
                .or_else(|| cst::child_of_kind(declarator, &["identifier"]))
            else {
                continue;
            };
            let name_token = self.token(name);
            let name = self.ident(name_token).unwrap_or_default().to_string();
            let value = self.initializer(declarator);
            if let (MemberKind::Const, Some(value)) = (kind, value) {
                self.tree.constant_ranges.push(value);
            }
            self.tree.members.push(MemberDecl {
                kind,
                owner,
                range,
                name_token: Some(name_token),
                name,
                type_ref: type_ref.clone(),
                modifiers: modifiers.clone(),
                explicit_interface: None,
                type_params: Vec::new(),
                attributes: attributes.clone(),
                params: TokenRange::default(),
                param_list: None,
                body: value,
            });
        }
    }

    /// Declares the parameters of a member, type or delegate.
    pub(crate) fn params(&mut self, list: Node<'_>, owner: ParamOwner) -> TokenRange {
        let first = self.tree.params.len();
        for parts in self.parameter_parts(list) {
            self.tree.params.push(ParamDecl {
                owner,
                range: parts.range,
                name_token: parts.name_token,
                name: parts.name,
                type_ref: parts.type_ref,
                modifiers: parts.modifiers,
                attributes: parts.attributes,
                default: parts.default,
            });
        }
        TokenRange::new(first, self.tree.params.len())
    }

    /// Splits a parameter list on its commas. A `params` array may sit
    /// directly in the list rather than under a `parameter` node.
    pub(crate) fn parameter_parts(&mut self, list: Node<'_>) -> Vec<ParamParts> {
        let mut groups: Vec<Vec<Node<'_>>> = vec![Vec::new()];
        for child in cst::children(list) {
            match child.kind() {
                "(" | ")" | "[" | "]" => {}
                "," => groups.push(Vec::new()),
                _ => {
                    if let Some(group) = groups.last_mut() {
                        group.push(child);
                    }
                }
            }
        }
        let mut parts = Vec::new();
        for group in groups {
            let parameter = match group.as_slice() {
                [single] if single.kind() == "parameter" => Some(*single),
                _ => None,
            };
            let elements = match parameter {
                Some(parameter) => cst::children(parameter),
                None => group,
            };
            if let Some(part) = self.parameter(&elements) {
                parts.push(part);
            }
        }
        parts
    }

    fn parameter(&mut self, elements: &[Node<'_>]) -> Option<ParamParts> {
        let (first, last) = (elements.first()?, elements.last()?);
        let eq = elements
            .iter()
            .position(|e| e.kind() == "=" || e.kind() == "equals_value_clause");
        let head = &elements[..eq.unwrap_or(elements.len())];
        let name_at = head.iter().rposition(|e| e.kind() == "identifier")?;

        let mut attributes = Vec::new();
        let mut modifiers = Vec::new();
        let mut type_node = None;
        for element in &head[..name_at] {
            if element.kind() == "attribute_list" {
                attributes.push(self.attribute_list(*element));
                continue;
            }
            let modifier = match self.tree.node_text(*element) {
                "this" => Some(Some(ParamModifier::This)),
                "ref" => Some(Some(ParamModifier::Ref)),
                "out" => Some(Some(ParamModifier::Out)),
                "in" => Some(Some(ParamModifier::In)),
                "params" => Some(Some(ParamModifier::Params)),
                "scoped" | "readonly" => Some(None),
                _ => None,
            };
            match modifier {
                Some(m) => modifiers.extend(m),
                None => type_node = Some(*element),
            }
        }

        let name_token = self.token(head[name_at]);
        let name = self.ident(name_token)?.to_string();
        let default = eq.and_then(|at| {
            let found = elements[at];
            if found.kind() == "equals_value_clause" {
                let range = self.range(found);
                Some(TokenRange::new(range.start + 1, range.end))
            } else {
                elements.get(at + 1).map(|v| self.range(*v))
            }
        });
        if let Some(default) = default {
            self.tree.constant_ranges.push(default);
        }
        Some(ParamParts {
            range: TokenRange::new(self.range(*first).start, self.range(*last).end),
            name_token,
            name,
            type_ref: type_node.and_then(|t| self.type_of(t)),
            modifiers,
            attributes,
            default,
        })
    }

    fn fill_owners(&mut self) {
        let tree = &mut self.tree;
        for (index, ns) in tree.namespaces.iter().enumerate() {
            for slot in &mut tree.namespace_of_token[ns.range.start..ns.range.end.min(tree.tokens.len())] {
                *slot = Some(index);
            }
        }
        for (index, ty) in tree.types.iter().enumerate() {
            for slot in &mut tree.type_of_token[ty.range.start..ty.range.end.min(tree.tokens.len())] {
                *slot = Some(index);
            }
        }
        for (index, member) in tree.members.iter().enumerate() {
            let end = member.range.end.min(tree.tokens.len());
            for i in member.range.start..end {
                // Nested type declarations never sit inside a member.
                if tree.type_of_token[i] == Some(member.owner) {
                    tree.member_of_token[i] = Some(index);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
using System;
using IO = System.IO;

namespace Demo.App
{
    [Serializable]
    public partial class Widget : Base, IGreeter
    {
        private const string Prefix = "Hi";
        private int count = 1, total;

        public Widget(int count) : base(count) { this.count = count; }

        public string Name { get; set; } = "w";

        public string Greet(string who, int times = 2) => Prefix + who;

        public int this[int i] => i;

        public static Widget operator +(Widget a, Widget b) => a;

        [DllImport("user32.dll")]
        private static extern int MessageBox(IntPtr h, string text, string caption, uint type);

        private enum Mode { Fast = 1, Slow }
    }
}
"#;

    #[test]
    fn parses_declarations() {
        let tree = SyntaxTree::parse(SAMPLE).unwrap();
        assert_eq!(tree.usings.len(), 2);
        assert_eq!(tree.usings[1].target_name, "System.IO");
        assert_eq!(tree.namespaces[0].full_name, "Demo.App");

        let names: Vec<_> = tree.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Widget", "Mode"]);
        assert_eq!(tree.types[0].bases.len(), 2);
        assert_eq!(tree.types[0].namespace, "Demo.App");
        assert_eq!(tree.types[1].parent, Some(0));

        let members: Vec<_> = tree
            .members
            .iter()
            .map(|m| (m.kind, m.name.as_str()))
            .collect();
        assert_eq!(
            members,
            vec![
                (MemberKind::Const, "Prefix"),
                (MemberKind::Field, "count"),
                (MemberKind::Field, "total"),
                (MemberKind::Constructor, "Widget"),
                (MemberKind::Property, "Name"),
                (MemberKind::Method, "Greet"),
                (MemberKind::Indexer, "this[]"),
                (MemberKind::Operator, "op_+"),
                (MemberKind::Method, "MessageBox"),
                (MemberKind::EnumMember, "Fast"),
                (MemberKind::EnumMember, "Slow"),
            ]
        );
        assert!(tree.members[8].has_modifier("extern"));
    }

    #[test]
    fn records_parameters_and_defaults() {
        let tree = SyntaxTree::parse(SAMPLE).unwrap();
        let greet = tree.members.iter().position(|m| m.name == "Greet").unwrap();
        let params: Vec<_> = tree
            .params
            .iter()
            .filter(|p| p.owner == ParamOwner::Member(greet))
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(params, vec!["who", "times"]);
        let default = tree.params.iter().find(|p| p.name == "times").unwrap();
        assert!(default.default.is_some());
    }

    #[test]
    fn constant_contexts_cover_attributes_and_consts() {
        let tree = SyntaxTree::parse(SAMPLE).unwrap();
        let string_at = |value: &str| {
            tree.tokens
                .iter()
                .position(|t| t.text(&tree.text) == value)
                .unwrap()
        };
        assert!(tree.in_constant_context(string_at("\"user32.dll\"")));
        assert!(tree.in_constant_context(string_at("\"Hi\"")));
        assert!(!tree.in_constant_context(string_at("\"w\"")));
    }

    #[test]
    fn file_scoped_namespace_and_items() {
        let src = "namespace A.B;\nusing System;\nclass C {}\n";
        let tree = SyntaxTree::parse(src).unwrap();
        assert!(tree.has_file_scoped_namespace());
        assert_eq!(tree.types[0].namespace, "A.B");
        assert_eq!(tree.items.len(), 1);
        assert_eq!(tree.usings[0].namespace, Some(0));
    }

    #[test]
    fn top_level_statements_are_opaque_items() {
        let src = "using System;\nConsole.WriteLine(\"hi\");\nclass C {}\n";
        let tree = SyntaxTree::parse(src).unwrap();
        let kinds: Vec<_> = tree.items.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![ItemKind::Using, ItemKind::Other, ItemKind::Type]);
    }

    #[test]
    fn unbalanced_brackets_are_errors() {
        assert!(matches!(
            SyntaxTree::parse("class C { void M( }"),
            Err(SyntaxError::Unbalanced { .. })
        ));
        assert!(matches!(
            SyntaxTree::parse("class C {"),
            Err(SyntaxError::Unclosed { .. })
        ));
    }

    #[test]
    fn malformed_declarations_are_errors() {
        assert!(matches!(
            SyntaxTree::parse("class C { int = ; }"),
            Err(SyntaxError::Invalid { .. } | SyntaxError::Missing { .. })
        ));
        assert!(SyntaxTree::parse("class C { int f = 1; }").is_ok());
    }

    #[test]
    fn records_and_primary_constructors() {
        let src = "record Point(int X, int Y) : Shape(X);\nrecord struct Pair(int A);\n";
        let tree = SyntaxTree::parse(src).unwrap();
        assert_eq!(tree.types[0].kind, TypeKind::Record);
        assert_eq!(tree.types[0].bases[0].simple_name(), "Shape");
        assert_eq!(tree.types[1].kind, TypeKind::RecordStruct);
        let names: Vec<_> = tree.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y", "A"]);
    }
}
