//! Whole-program symbol table.
//!
//! Every declaration in every unit gets a [`Symbol`] with a fully-qualified
//! display name. Partial type declarations share one symbol, and members that
//! override or implement a program-declared base member are linked into one
//! family so they keep a single identity.

use crate::program::Program;
use crate::syntax::{LocalKind, MemberKind, ParamModifier, ParamOwner, SyntaxTree, TypeKind, UsingDirective};
use crate::types::TypeRef;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Display prefix for locals of top-level statements.
pub const TOP_LEVEL: &str = "<Main>$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Namespace,
    Type(TypeKind),
    Method,
    Constructor,
    Destructor,
    Property,
    Indexer,
    Operator,
    Field,
    Const,
    Event,
    EnumMember,
    Parameter,
    Local,
    LocalFunction,
}

impl SymbolKind {
    pub const fn is_type(&self) -> bool {
        matches!(self, Self::Type(_))
    }

    /// Kinds that live in a type's member list.
    pub const fn is_member(&self) -> bool {
        matches!(
            self,
            Self::Method
                | Self::Constructor
                | Self::Destructor
                | Self::Property
                | Self::Indexer
                | Self::Operator
                | Self::Field
                | Self::Const
                | Self::Event
                | Self::EnumMember
        )
    }

    pub const fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Method | Self::Constructor | Self::Operator | Self::LocalFunction
        )
    }

    /// Kinds whose uses produce a value of their declared type.
    pub const fn is_value(&self) -> bool {
        matches!(
            self,
            Self::Property
                | Self::Field
                | Self::Const
                | Self::Event
                | Self::EnumMember
                | Self::Parameter
                | Self::Local
        )
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Type(TypeKind::Class) => "class",
            Self::Type(TypeKind::Struct) => "struct",
            Self::Type(TypeKind::Interface) => "interface",
            Self::Type(TypeKind::Enum) => "enum",
            Self::Type(TypeKind::Record | TypeKind::RecordStruct) => "record",
            Self::Type(TypeKind::Delegate) => "delegate",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Destructor => "destructor",
            Self::Property => "property",
            Self::Indexer => "indexer",
            Self::Operator => "operator",
            Self::Field => "field",
            Self::Const => "const",
            Self::Event => "event",
            Self::EnumMember => "enum member",
            Self::Parameter => "parameter",
            Self::Local => "local",
            Self::LocalFunction => "local function",
        }
    }
}

/// Where a symbol is declared: unit index plus an index into one of the
/// tree's declaration lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Namespace { unit: usize, decl: usize },
    Type { unit: usize, decl: usize },
    Member { unit: usize, decl: usize },
    Param { unit: usize, decl: usize },
    Local { unit: usize, decl: usize },
}

impl Origin {
    pub const fn unit(&self) -> usize {
        match *self {
            Self::Namespace { unit, .. }
            | Self::Type { unit, .. }
            | Self::Member { unit, .. }
            | Self::Param { unit, .. }
            | Self::Local { unit, .. } => unit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    /// Fully-qualified name, e.g. `Demo.Widget.Greet.who`.
    pub display: String,
    pub parent: Option<SymbolId>,
    pub origins: Vec<Origin>,
    /// `(unit, token)` of every declaring name occurrence.
    pub name_tokens: Vec<(usize, usize)>,
    pub is_static: bool,
    pub is_extern: bool,
    pub is_extension: bool,
    /// Overrides or implements a member the program does not declare.
    pub external: bool,
    children: IndexMap<String, Vec<SymbolId>>,
    bases: Vec<SymbolId>,
    external_base: bool,
    type_params: Vec<String>,
}

impl Symbol {
    fn new(id: SymbolId, kind: SymbolKind, name: &str, display: String, parent: Option<SymbolId>) -> Self {
        Self {
            id,
            kind,
            name: name.to_string(),
            display,
            parent,
            origins: Vec::new(),
            name_tokens: Vec::new(),
            is_static: false,
            is_extern: false,
            is_extension: false,
            external: false,
            children: IndexMap::new(),
            bases: Vec::new(),
            external_base: false,
            type_params: Vec::new(),
        }
    }

    /// Program-declared direct base types.
    pub fn bases(&self) -> &[SymbolId] {
        &self.bases
    }

    /// Whether some base type is declared outside the program.
    pub fn has_external_base(&self) -> bool {
        self.external_base
    }

    pub fn type_params(&self) -> &[String] {
        &self.type_params
    }

    pub fn children(&self, name: &str) -> &[SymbolId] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    root: SymbolId,
    namespaces: HashMap<String, SymbolId>,
    decls: HashMap<(usize, usize), SymbolId>,
    type_decls: HashMap<(usize, usize), SymbolId>,
    member_decls: HashMap<(usize, usize), SymbolId>,
    param_decls: HashMap<(usize, usize), SymbolId>,
    local_decls: HashMap<(usize, usize), SymbolId>,
    extensions: IndexMap<String, Vec<SymbolId>>,
    family: Vec<SymbolId>,
}

impl SymbolTable {
    pub fn build(program: &Program) -> Self {
        let root_id = SymbolId(0);
        let mut table = Self {
            symbols: vec![Symbol::new(root_id, SymbolKind::Namespace, "", String::new(), None)],
            root: root_id,
            namespaces: HashMap::from([(String::new(), root_id)]),
            decls: HashMap::new(),
            type_decls: HashMap::new(),
            member_decls: HashMap::new(),
            param_decls: HashMap::new(),
            local_decls: HashMap::new(),
            extensions: IndexMap::new(),
            family: Vec::new(),
        };

        for (unit, source) in program.units().iter().enumerate() {
            let tree = source.tree();
            table.declare_namespaces(unit, tree);
            table.declare_types(unit, tree);
            table.declare_members(unit, tree);
            table.declare_params(unit, tree);
            table.declare_locals(unit, tree);
        }
        table.resolve_bases(program);
        table.link_families(program);

        tracing::debug!(
            "Built symbol table: {} symbols across {} units",
            table.symbols.len(),
            program.len()
        );
        table
    }

    fn push(&mut self, kind: SymbolKind, name: &str, parent: Option<SymbolId>) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        let display = match parent.map(|p| self.symbols[p.0].display.as_str()) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}.{name}"),
            _ => name.to_string(),
        };
        self.symbols.push(Symbol::new(id, kind, name, display, parent));
        id
    }

    fn add_child(&mut self, parent: SymbolId, child: SymbolId) {
        let name = self.symbols[child.0].name.clone();
        self.symbols[parent.0]
            .children
            .entry(name)
            .or_default()
            .push(child);
    }

    fn namespace_symbol(&mut self, full_name: &str) -> SymbolId {
        if let Some(id) = self.namespaces.get(full_name) {
            return *id;
        }
        let (parent, name) = match full_name.rsplit_once('.') {
            Some((outer, name)) => (self.namespace_symbol(outer), name),
            None => (self.root, full_name),
        };
        let id = self.push(SymbolKind::Namespace, name, Some(parent));
        self.add_child(parent, id);
        self.namespaces.insert(full_name.to_string(), id);
        id
    }

    fn declare_namespaces(&mut self, unit: usize, tree: &SyntaxTree) {
        for (index, ns) in tree.namespaces.iter().enumerate() {
            let outer = ns
                .parent
                .map(|p| tree.namespaces[p].full_name.clone())
                .unwrap_or_default();
            let mut prefix = outer;
            for &token in &ns.name_tokens {
                let Some(part) = tree.ident(token) else {
                    continue;
                };
                prefix = if prefix.is_empty() {
                    part.to_string()
                } else {
                    format!("{prefix}.{part}")
                };
                let id = self.namespace_symbol(&prefix);
                let symbol = &mut self.symbols[id.0];
                symbol.name_tokens.push((unit, token));
                self.decls.insert((unit, token), id);
            }
            let id = self.namespace_symbol(&ns.full_name);
            self.symbols[id.0].origins.push(Origin::Namespace { unit, decl: index });
        }
    }

    fn declare_types(&mut self, unit: usize, tree: &SyntaxTree) {
        for (index, decl) in tree.types.iter().enumerate() {
            let parent = match decl.parent {
                Some(p) => self.type_decls.get(&(unit, p)).copied(),
                None => Some(self.namespace_symbol(&decl.namespace)),
            };
            let Some(parent) = parent else {
                continue;
            };
            let kind = SymbolKind::Type(decl.kind);
            let existing = self.symbols[parent.0]
                .children(&decl.name)
                .iter()
                .copied()
                .find(|c| self.symbols[c.0].kind.is_type());
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = self.push(kind, &decl.name, Some(parent));
                    self.add_child(parent, id);
                    id
                }
            };
            let symbol = &mut self.symbols[id.0];
            symbol.origins.push(Origin::Type { unit, decl: index });
            symbol.name_tokens.push((unit, decl.name_token));
            symbol.is_static |= decl.has_modifier("static");
            for &token in &decl.type_params {
                if let Some(name) = tree.ident(token) {
                    if !symbol.type_params.iter().any(|p| p == name) {
                        symbol.type_params.push(name.to_string());
                    }
                }
            }
            self.decls.insert((unit, decl.name_token), id);
            self.type_decls.insert((unit, index), id);
        }
    }

    fn declare_members(&mut self, unit: usize, tree: &SyntaxTree) {
        for (index, decl) in tree.members.iter().enumerate() {
            let Some(owner) = self.type_decls.get(&(unit, decl.owner)).copied() else {
                continue;
            };
            let (kind, name) = match decl.kind {
                MemberKind::Method => (SymbolKind::Method, decl.name.as_str()),
                MemberKind::Constructor => (SymbolKind::Constructor, ".ctor"),
                MemberKind::Destructor => (SymbolKind::Destructor, ".dtor"),
                MemberKind::Property => (SymbolKind::Property, decl.name.as_str()),
                MemberKind::Indexer => (SymbolKind::Indexer, decl.name.as_str()),
                MemberKind::Operator | MemberKind::Conversion => {
                    (SymbolKind::Operator, decl.name.as_str())
                }
                MemberKind::Field => (SymbolKind::Field, decl.name.as_str()),
                MemberKind::Const => (SymbolKind::Const, decl.name.as_str()),
                MemberKind::Event => (SymbolKind::Event, decl.name.as_str()),
                MemberKind::EnumMember => (SymbolKind::EnumMember, decl.name.as_str()),
            };

            // Partial method halves share a symbol.
            let partial = decl.has_modifier("partial") && kind == SymbolKind::Method;
            let existing = partial
                .then(|| {
                    self.symbols[owner.0]
                        .children(name)
                        .iter()
                        .copied()
                        .find(|c| self.symbols[c.0].kind == kind)
                })
                .flatten();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = self.push(kind, name, Some(owner));
                    self.add_child(owner, id);
                    id
                }
            };

            let owner_static = self.symbols[owner.0].is_static;
            let symbol = &mut self.symbols[id.0];
            symbol.origins.push(Origin::Member { unit, decl: index });
            symbol.is_static |= decl.has_modifier("static")
                || matches!(kind, SymbolKind::Const | SymbolKind::EnumMember);
            symbol.is_extern |= decl.has_modifier("extern");
            for &token in &decl.type_params {
                if let Some(name) = tree.ident(token) {
                    symbol.type_params.push(name.to_string());
                }
            }
            if kind == SymbolKind::Method
                && owner_static
                && decl.has_modifier("static")
                && !decl.params.is_empty()
                && tree
                    .params
                    .get(decl.params.start)
                    .is_some_and(|p| p.has_modifier(ParamModifier::This))
            {
                symbol.is_extension = true;
                self.extensions.entry(decl.name.clone()).or_default().push(id);
            }
            self.member_decls.insert((unit, index), id);

            let Some(token) = decl.name_token else {
                continue;
            };
            match kind {
                // Constructor and destructor names are the type's name.
                SymbolKind::Constructor | SymbolKind::Destructor => {
                    self.decls.insert((unit, token), owner);
                    self.symbols[owner.0].name_tokens.push((unit, token));
                }
                _ => {
                    self.symbols[id.0].name_tokens.push((unit, token));
                    self.decls.insert((unit, token), id);
                }
            }
        }
    }

    fn declare_params(&mut self, unit: usize, tree: &SyntaxTree) {
        for (index, decl) in tree.params.iter().enumerate() {
            let (parent, kind, visible) = match decl.owner {
                ParamOwner::Member(m) => match self.member_decls.get(&(unit, m)) {
                    Some(&owner) => (owner, SymbolKind::Parameter, false),
                    None => continue,
                },
                ParamOwner::Type(t) => {
                    let Some(&owner) = self.type_decls.get(&(unit, t)) else {
                        continue;
                    };
                    match tree.types[t].kind {
                        TypeKind::Record | TypeKind::RecordStruct => {
                            (owner, SymbolKind::Property, true)
                        }
                        TypeKind::Delegate => (owner, SymbolKind::Parameter, false),
                        _ => (owner, SymbolKind::Parameter, true),
                    }
                }
                ParamOwner::LocalFunction(l) => match self.local_decls.get(&(unit, l)) {
                    Some(&owner) => (owner, SymbolKind::Parameter, false),
                    None => continue,
                },
            };
            let key = format!("({})", decl.name);
            let existing = self.symbols[parent.0]
                .children(&key)
                .iter()
                .copied()
                .find(|c| self.symbols[c.0].kind == kind);
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = self.push(kind, &decl.name, Some(parent));
                    self.symbols[parent.0]
                        .children
                        .entry(key)
                        .or_default()
                        .push(id);
                    if visible {
                        self.add_child(parent, id);
                    }
                    id
                }
            };
            let symbol = &mut self.symbols[id.0];
            symbol.origins.push(Origin::Param { unit, decl: index });
            symbol.name_tokens.push((unit, decl.name_token));
            self.decls.insert((unit, decl.name_token), id);
            self.param_decls.insert((unit, index), id);
        }
    }

    fn declare_locals(&mut self, unit: usize, tree: &SyntaxTree) {
        for (index, decl) in tree.locals.iter().enumerate() {
            let parent = tree
                .member_at(decl.name_token)
                .and_then(|m| self.member_decls.get(&(unit, m)).copied())
                .or_else(|| {
                    tree.type_at(decl.name_token)
                        .and_then(|t| self.type_decls.get(&(unit, t)).copied())
                });
            let kind = match decl.kind {
                LocalKind::Function => SymbolKind::LocalFunction,
                LocalKind::FunctionParam | LocalKind::Lambda => SymbolKind::Parameter,
                _ => SymbolKind::Local,
            };
            let id = match parent {
                Some(parent) => self.push(kind, &decl.name, Some(parent)),
                None => {
                    let id = SymbolId(self.symbols.len());
                    self.symbols.push(Symbol::new(
                        id,
                        kind,
                        &decl.name,
                        format!("{TOP_LEVEL}.{}", decl.name),
                        None,
                    ));
                    id
                }
            };
            let symbol = &mut self.symbols[id.0];
            symbol.origins.push(Origin::Local { unit, decl: index });
            symbol.name_tokens.push((unit, decl.name_token));
            self.decls.insert((unit, decl.name_token), id);
            self.local_decls.insert((unit, index), id);
        }
    }

    fn resolve_bases(&mut self, program: &Program) {
        for index in 0..self.symbols.len() {
            if !self.symbols[index].kind.is_type() {
                continue;
            }
            let mut bases = Vec::new();
            let mut external = false;
            for origin in self.symbols[index].origins.clone() {
                let Origin::Type { unit, decl } = origin else {
                    continue;
                };
                let Some(source) = program.unit(unit) else {
                    continue;
                };
                let tree = source.tree();
                let ty = &tree.types[decl];
                for base in &ty.bases {
                    match self.resolve_type(program, unit, ty.name_token, base) {
                        Some(id) if self.symbols[id.0].kind.is_type() && id.0 != index => {
                            if !bases.contains(&id) {
                                bases.push(id);
                            }
                        }
                        _ => external = true,
                    }
                }
            }
            let symbol = &mut self.symbols[index];
            symbol.bases = bases;
            symbol.external_base = external;
        }
    }

    fn link_families(&mut self, program: &Program) {
        self.family = (0..self.symbols.len()).map(SymbolId).collect();
        for index in 0..self.symbols.len() {
            let kind = self.symbols[index].kind;
            if !matches!(
                kind,
                SymbolKind::Method | SymbolKind::Property | SymbolKind::Event | SymbolKind::Indexer
            ) || self.symbols[index].is_static
            {
                continue;
            }
            let Some(owner) = self.symbols[index].parent else {
                continue;
            };
            let name = self.symbols[index].name.clone();

            let mut linked = false;
            for base in self.base_closure(owner) {
                let matches: Vec<SymbolId> = self.symbols[base.0]
                    .children(&name)
                    .iter()
                    .copied()
                    .filter(|c| self.symbols[c.0].kind == kind && !self.symbols[c.0].is_static)
                    .collect();
                for other in matches {
                    self.union(SymbolId(index), other);
                    linked = true;
                }
            }

            let mut overrides = false;
            let mut explicit_external = false;
            let origins = self.symbols[index].origins.clone();
            for origin in origins {
                let Origin::Member { unit, decl } = origin else {
                    continue;
                };
                let Some(source) = program.unit(unit) else {
                    continue;
                };
                let tree = source.tree();
                let member = &tree.members[decl];
                overrides |= member.has_modifier("override");
                if let Some(iface) = &member.explicit_interface {
                    let anchor = member.name_token.unwrap_or(member.range.start);
                    match self.resolve_type(program, unit, anchor, iface) {
                        Some(id) if self.symbols[id.0].kind.is_type() => {
                            let targets: Vec<SymbolId> = self
                                .lookup_member(id, &name)
                                .into_iter()
                                .filter(|c| self.symbols[c.0].kind == kind)
                                .collect();
                            for target in targets {
                                self.union(SymbolId(index), target);
                                linked = true;
                            }
                        }
                        _ => explicit_external = true,
                    }
                }
            }
            if explicit_external || (overrides && !linked) {
                self.symbols[index].external = true;
            }
        }

        for index in 0..self.family.len() {
            let root = self.find(SymbolId(index));
            self.family[index] = root;
        }
        // External members taint their whole family.
        let tainted: HashSet<SymbolId> = self
            .symbols
            .iter()
            .filter(|s| s.external)
            .map(|s| self.family[s.id.0])
            .collect();
        for index in 0..self.symbols.len() {
            if tainted.contains(&self.family[index]) {
                self.symbols[index].external = true;
            }
        }
    }

    fn find(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        while self.family[current.0] != current {
            current = self.family[current.0];
        }
        current
    }

    fn union(&mut self, a: SymbolId, b: SymbolId) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.family[child.0] = root;
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn root(&self) -> SymbolId {
        self.root
    }

    pub fn namespace(&self, full_name: &str) -> Option<SymbolId> {
        self.namespaces.get(full_name).copied()
    }

    /// Symbol declared by the name token at `(unit, token)`.
    pub fn declared_at(&self, unit: usize, token: usize) -> Option<SymbolId> {
        self.decls.get(&(unit, token)).copied()
    }

    pub fn type_symbol(&self, unit: usize, decl: usize) -> Option<SymbolId> {
        self.type_decls.get(&(unit, decl)).copied()
    }

    pub fn member_symbol(&self, unit: usize, decl: usize) -> Option<SymbolId> {
        self.member_decls.get(&(unit, decl)).copied()
    }

    pub fn param_symbol(&self, unit: usize, decl: usize) -> Option<SymbolId> {
        self.param_decls.get(&(unit, decl)).copied()
    }

    pub fn local_symbol(&self, unit: usize, decl: usize) -> Option<SymbolId> {
        self.local_decls.get(&(unit, decl)).copied()
    }

    /// Family representative: the symbol whose identity the whole family
    /// shares.
    pub fn family(&self, id: SymbolId) -> SymbolId {
        self.family.get(id.0).copied().unwrap_or(id)
    }

    /// Display name used for identity keys.
    pub fn identity_name(&self, id: SymbolId) -> &str {
        &self.symbols[self.family(id).0].display
    }

    pub fn extensions(&self, name: &str) -> &[SymbolId] {
        self.extensions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parameters visible by name inside a callable, across its overloads.
    pub fn parameters(&self, callable: SymbolId, name: &str) -> &[SymbolId] {
        self.symbols[callable.0].children(&format!("({name})"))
    }

    /// `id` followed by all its program-declared base types, breadth first.
    pub fn base_closure(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut seen = HashSet::from([id]);
        let mut order = Vec::new();
        let mut queue: VecDeque<SymbolId> = self.symbols[id.0].bases.iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            order.push(next);
            queue.extend(self.symbols[next.0].bases.iter().copied());
        }
        order
    }

    /// Members and nested types named `name` on a type or its bases.
    pub fn lookup_member(&self, ty: SymbolId, name: &str) -> Vec<SymbolId> {
        let own = self.symbols[ty.0].children(name);
        if !own.is_empty() {
            return own.to_vec();
        }
        self.base_closure(ty)
            .into_iter()
            .map(|b| self.symbols[b.0].children(name))
            .find(|found| !found.is_empty())
            .map(<[SymbolId]>::to_vec)
            .unwrap_or_default()
    }

    /// Whether any type in the closure has a base the program does not
    /// declare.
    pub fn has_external_ancestry(&self, ty: SymbolId) -> bool {
        self.symbols[ty.0].external_base
            || self
                .base_closure(ty)
                .iter()
                .any(|b| self.symbols[b.0].external_base)
    }

    fn nested_type(&self, ty: SymbolId, name: &str) -> Option<SymbolId> {
        self.lookup_member(ty, name)
            .into_iter()
            .find(|c| self.symbols[c.0].kind.is_type())
    }

    fn child_of(&self, scope: SymbolId, name: &str) -> Option<SymbolId> {
        if self.symbols[scope.0].kind.is_type() {
            return self.nested_type(scope, name);
        }
        self.symbols[scope.0]
            .children(name)
            .iter()
            .copied()
            .find(|c| matches!(self.symbols[c.0].kind, SymbolKind::Type(_) | SymbolKind::Namespace))
    }

    /// Resolves a simple type or namespace name as seen from token `at`.
    ///
    /// Searches enclosing types (and their bases), enclosing namespaces with
    /// the using directives declared inside them, the global namespace, then
    /// compilation-unit and global using directives. `None` means the program
    /// does not declare it, or it is an alias for something external.
    pub fn lookup_type_name(
        &self,
        program: &Program,
        unit: usize,
        at: usize,
        name: &str,
    ) -> Option<SymbolId> {
        let tree = program.unit(unit)?.tree();

        let mut ty = tree.type_at(at);
        while let Some(t) = ty {
            if let Some(id) = self.type_decls.get(&(unit, t)) {
                if self.symbols[id.0].type_params.iter().any(|p| p == name) {
                    return None;
                }
                if self.symbols[id.0].name == name {
                    return Some(*id);
                }
                if let Some(found) = self.nested_type(*id, name) {
                    return Some(found);
                }
            }
            ty = tree.types[t].parent;
        }

        let mut decl = tree.namespace_at(at);
        while let Some(d) = decl {
            let ns = &tree.namespaces[d];
            let floor = ns
                .parent
                .map(|p| tree.namespaces[p].full_name.as_str())
                .unwrap_or("");
            let mut full = ns.full_name.as_str();
            loop {
                if let Some(found) = self
                    .namespaces
                    .get(full)
                    .and_then(|id| self.child_of(*id, name))
                {
                    return Some(found);
                }
                match full.rsplit_once('.') {
                    Some((outer, _)) if outer != floor => full = outer,
                    _ => break,
                }
            }
            if let Some(found) = self.using_lookup(program, unit, Some(d), name) {
                return found;
            }
            decl = ns.parent;
        }

        if let Some(found) = self.child_of(self.root, name) {
            return Some(found);
        }
        self.using_lookup(program, unit, None, name).flatten()
    }

    /// Looks `name` up through the using directives of one scope. The outer
    /// `Some` means a directive matched; the inner value is `None` when it
    /// matched an external alias.
    fn using_lookup(
        &self,
        program: &Program,
        unit: usize,
        scope: Option<usize>,
        name: &str,
    ) -> Option<Option<SymbolId>> {
        let mut directives: Vec<(usize, &UsingDirective)> = program
            .unit(unit)?
            .tree()
            .usings
            .iter()
            .filter(|d| d.namespace == scope)
            .map(|d| (unit, d))
            .collect();
        if scope.is_none() {
            for (other, source) in program.units().iter().enumerate() {
                if other == unit {
                    continue;
                }
                directives.extend(
                    source
                        .tree()
                        .usings
                        .iter()
                        .filter(|d| d.is_global)
                        .map(|d| (other, d)),
                );
            }
        }

        for (u, directive) in &directives {
            let Some(alias) = directive.alias else {
                continue;
            };
            let tree = program.unit(*u)?.tree();
            if tree.ident(alias) == Some(name) {
                let target = crate::types::parse_type(
                    &tree.text,
                    &tree.tokens,
                    directive.target.start,
                    directive.target.end,
                );
                return Some(target.and_then(|(ty, _)| self.resolve_qualified(&ty)));
            }
        }
        for (_, directive) in &directives {
            if directive.alias.is_some() {
                continue;
            }
            let Some(target) = self.qualified_symbol(&directive.target_name) else {
                continue;
            };
            let found = if directive.is_static {
                self.nested_type(target, name)
            } else {
                self.symbols[target.0]
                    .children(name)
                    .iter()
                    .copied()
                    .find(|c| self.symbols[c.0].kind.is_type())
            };
            if found.is_some() {
                return Some(found);
            }
        }
        None
    }

    /// Resolves a dotted name from the global namespace.
    pub fn qualified_symbol(&self, dotted: &str) -> Option<SymbolId> {
        let mut current = self.root;
        for part in dotted.split('.') {
            current = self.child_of(current, part)?;
        }
        Some(current)
    }

    fn resolve_qualified(&self, ty: &TypeRef) -> Option<SymbolId> {
        if ty.keyword || ty.is_tuple() {
            return None;
        }
        self.qualified_symbol(&ty.qualified_name())
    }

    /// Resolves a type reference written at token `at` to a program type or
    /// namespace.
    pub fn resolve_type(
        &self,
        program: &Program,
        unit: usize,
        at: usize,
        ty: &TypeRef,
    ) -> Option<SymbolId> {
        if ty.keyword || ty.is_tuple() {
            return None;
        }
        let (first, rest) = ty.segments.split_first()?;
        let mut current = match ty.alias.as_deref() {
            Some("global") => self.child_of(self.root, &first.name)?,
            Some(_) => return None,
            None => self.lookup_type_name(program, unit, at, &first.name)?,
        };
        for segment in rest {
            current = self.child_of(current, &segment.name)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(sources: &[(&str, &str)]) -> (Program, SymbolTable) {
        let program = Program::from_sources("App", sources.iter().copied()).unwrap();
        let table = SymbolTable::build(&program);
        (program, table)
    }

    fn find<'a>(table: &'a SymbolTable, display: &str) -> Vec<&'a Symbol> {
        table
            .symbols()
            .iter()
            .filter(|s| s.display == display)
            .collect()
    }

    #[test]
    fn display_names_are_fully_qualified() {
        let (_, table) = table(&[(
            "a.cs",
            "namespace Demo.App { class Widget { int count; string Greet(string who) { var n = who; return n; } } }",
        )]);
        for display in [
            "Demo",
            "Demo.App",
            "Demo.App.Widget",
            "Demo.App.Widget.count",
            "Demo.App.Widget.Greet",
            "Demo.App.Widget.Greet.who",
            "Demo.App.Widget.Greet.n",
        ] {
            assert_eq!(find(&table, display).len(), 1, "{display}");
        }
    }

    #[test]
    fn partial_types_merge() {
        let (_, table) = table(&[
            ("a.cs", "namespace N { partial class Widget { void A() {} } }"),
            ("b.cs", "namespace N { partial class Widget { void B() {} } }"),
        ]);
        let widget = find(&table, "N.Widget");
        assert_eq!(widget.len(), 1);
        assert_eq!(widget[0].origins.len(), 2);
        assert_eq!(widget[0].name_tokens.len(), 2);
    }

    #[test]
    fn constructor_names_map_to_the_type() {
        let (program, table) = table(&[("a.cs", "class Widget { public Widget() {} ~Widget() {} }")]);
        let tree = program.units()[0].tree();
        let widget = find(&table, "Widget")[0].id;
        let ctor_name = tree.members[0].name_token.unwrap();
        let dtor_name = tree.members[1].name_token.unwrap();
        assert_eq!(table.declared_at(0, ctor_name), Some(widget));
        assert_eq!(table.declared_at(0, dtor_name), Some(widget));
        assert_eq!(table.get(widget).name_tokens.len(), 3);
    }

    #[test]
    fn overrides_and_implementations_share_a_family() {
        let (_, table) = table(&[(
            "a.cs",
            r#"
interface IGreeter { string Greet(); }
abstract class Base { public abstract int Size { get; } }
class Widget : Base, IGreeter {
    public string Greet() => "hi";
    public override int Size => 1;
    public override string ToString() => "w";
}
"#,
        )]);
        let iface = find(&table, "IGreeter.Greet")[0].id;
        let greet = find(&table, "Widget.Greet")[0].id;
        assert_eq!(table.family(greet), table.family(iface));
        assert_eq!(table.identity_name(greet), "IGreeter.Greet");

        let size = find(&table, "Widget.Size")[0];
        assert_eq!(table.identity_name(size.id), "Base.Size");
        assert!(!size.external);

        assert!(find(&table, "Widget.ToString")[0].external);
    }

    #[test]
    fn explicit_external_implementations_are_external() {
        let (_, table) = table(&[(
            "a.cs",
            "using System; class Res : IDisposable { void IDisposable.Dispose() {} }",
        )]);
        let dispose = find(&table, "Res.Dispose")[0];
        assert!(dispose.external);
        assert!(table.get(find(&table, "Res")[0].id).has_external_base());
    }

    #[test]
    fn explicit_program_implementations_join_the_interface_family() {
        let (_, table) = table(&[(
            "a.cs",
            "interface IShape { int Area(); } class Square : IShape { int IShape.Area() => 1; }",
        )]);
        let declared = find(&table, "IShape.Area")[0].id;
        let explicit = find(&table, "Square.Area")[0];
        assert!(!explicit.external);
        assert_eq!(table.family(explicit.id), table.family(declared));
    }

    #[test]
    fn record_parameters_become_properties() {
        let (_, table) = table(&[("a.cs", "record Point(int X, int Y); class Box(int size) { }")]);
        assert_eq!(find(&table, "Point.X")[0].kind, SymbolKind::Property);
        assert_eq!(find(&table, "Box.size")[0].kind, SymbolKind::Parameter);
    }

    #[test]
    fn extension_methods_are_indexed() {
        let (_, table) = table(&[(
            "a.cs",
            "static class Text { public static string Shout(this string s) => s; }",
        )]);
        assert_eq!(table.extensions("Shout").len(), 1);
        assert!(table.extensions("Whisper").is_empty());
    }

    #[test]
    fn type_names_resolve_through_usings_and_aliases() {
        let (program, table) = table(&[
            ("lib.cs", "namespace Lib.Models { class Widget { } }"),
            (
                "app.cs",
                "using Lib.Models; using W = Lib.Models.Widget; namespace App { class Runner { Widget a; W b; } }",
            ),
        ]);
        let widget = find(&table, "Lib.Models.Widget")[0].id;
        let tree = program.units()[1].tree();
        let field = tree.members[0].name_token.unwrap();
        assert_eq!(table.lookup_type_name(&program, 1, field, "Widget"), Some(widget));
        assert_eq!(table.lookup_type_name(&program, 1, field, "W"), Some(widget));
        assert_eq!(table.lookup_type_name(&program, 1, field, "Stream"), None);
    }

    #[test]
    fn top_level_locals_have_a_synthetic_owner() {
        let (_, table) = table(&[("main.cs", "var total = 1;\nSystem.Console.WriteLine(total);")]);
        assert_eq!(find(&table, "<Main>$.total").len(), 1);
    }
}
