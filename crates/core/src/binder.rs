//! Binds name occurrences to symbols.
//!
//! Binding is lexical plus a small amount of type inference for member access
//! receivers. Anything the program does not declare binds as
//! [`Binding::External`]; a member access whose receiver cannot be typed binds
//! as [`Binding::Unbound`].

use crate::lexer::TokenKind;
use crate::program::Program;
use crate::symbols::{Origin, SymbolId, SymbolKind, SymbolTable};
use crate::syntax::{Creation, LocalKind, SyntaxTree, TokenRange, TypeKind};
use crate::types::{parse_type, TypeRef, PREDEFINED_TYPES};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Recursion limit for receiver inference.
const MAX_DEPTH: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Symbol(SymbolId),
    Namespace(SymbolId),
    TypeParameter,
    External,
    Unbound,
}

impl Binding {
    pub const fn symbol(&self) -> Option<SymbolId> {
        match *self {
            Self::Symbol(id) => Some(id),
            _ => None,
        }
    }
}

/// Inferred type of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// A value of a program type.
    Program(SymbolId),
    /// The type itself, as in `Widget.Create()`.
    Static(SymbolId),
    Namespace(SymbolId),
    Array(Box<Ty>),
    Generic(Box<Ty>, Vec<Ty>),
    External,
    Unknown,
}

impl Ty {
    /// Program type behind the value, if any.
    pub fn program_type(&self) -> Option<SymbolId> {
        match self {
            Self::Program(id) | Self::Static(id) => Some(*id),
            Self::Generic(inner, _) => inner.program_type(),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Binder<'a> {
    program: &'a Program,
    symbols: &'a SymbolTable,
    cache: RefCell<HashMap<(usize, usize), Binding>>,
    depth: Cell<usize>,
}

impl<'a> Binder<'a> {
    pub fn new(program: &'a Program, symbols: &'a SymbolTable) -> Self {
        Self {
            program,
            symbols,
            cache: RefCell::new(HashMap::new()),
            depth: Cell::new(0),
        }
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn symbols(&self) -> &'a SymbolTable {
        self.symbols
    }

    fn tree(&self, unit: usize) -> Option<&'a SyntaxTree> {
        self.program.unit(unit).map(|u| u.tree())
    }

    /// Binds the identifier token at `(unit, token)`.
    pub fn bind(&self, unit: usize, token: usize) -> Binding {
        let cached = self.cache.borrow().get(&(unit, token)).copied();
        if let Some(binding) = cached {
            return binding;
        }
        if self.depth.get() > MAX_DEPTH {
            return Binding::Unbound;
        }
        self.depth.set(self.depth.get() + 1);
        let binding = self.bind_uncached(unit, token);
        self.depth.set(self.depth.get() - 1);
        self.cache.borrow_mut().insert((unit, token), binding);
        binding
    }

    fn bind_uncached(&self, unit: usize, token: usize) -> Binding {
        let Some(tree) = self.tree(unit) else {
            return Binding::Unbound;
        };
        let Some(name) = tree.ident(token) else {
            return Binding::External;
        };

        if let Some(id) = self.symbols.declared_at(unit, token) {
            return self.wrap(id);
        }
        if let Some(binding) = self.attribute_name(tree, unit, token, name) {
            return binding;
        }
        if tree.is_member_access_name(token) {
            if token >= 2 {
                let receiver = self.infer(unit, token - 2);
                return self.member_of(&receiver, name);
            }
            return Binding::Unbound;
        }
        if token >= 2 && tree.is_punct(token - 1, "::") {
            if tree.ident(token - 2) == Some("global") {
                return self
                    .symbols
                    .qualified_symbol(name)
                    .map_or(Binding::External, |id| self.wrap(id));
            }
            return Binding::External;
        }
        if let Some(binding) = self.named_argument(tree, unit, token, name) {
            return binding;
        }
        if let Some(binding) = self.initializer_member(tree, unit, token, name) {
            return binding;
        }
        self.simple_name(tree, unit, token, name)
    }

    fn wrap(&self, id: SymbolId) -> Binding {
        if self.symbols.get(id).kind == SymbolKind::Namespace {
            Binding::Namespace(id)
        } else {
            Binding::Symbol(id)
        }
    }

    /// `[Obsolete]` binds to `ObsoleteAttribute` when no `Obsolete` exists.
    fn attribute_name(&self, tree: &SyntaxTree, unit: usize, token: usize, name: &str) -> Option<Binding> {
        let list = tree.attributes.iter().find(|a| a.range.contains(token))?;
        let attribute = list
            .attributes
            .iter()
            .find(|a| a.name.segments.len() == 1 && a.name.segments[0].token == token)?;
        if attribute.name.alias.is_some() {
            return None;
        }
        let found = self
            .symbols
            .lookup_type_name(self.program, unit, token, name)
            .or_else(|| {
                self.symbols
                    .lookup_type_name(self.program, unit, token, &format!("{name}Attribute"))
            });
        Some(found.map_or(Binding::External, |id| self.wrap(id)))
    }

    /// `Call(name: value)`.
    fn named_argument(&self, tree: &SyntaxTree, unit: usize, token: usize, name: &str) -> Option<Binding> {
        if token == 0 || !tree.is_punct(token + 1, ":") {
            return None;
        }
        if !(tree.is_punct(token - 1, "(") || tree.is_punct(token - 1, ",")) {
            return None;
        }
        let open = tree.enclosing_bracket(token)?;
        if !tree.is_punct(open, "(") {
            return None;
        }
        let callables = self.callables_at(tree, unit, open);
        let Some(callables) = callables else {
            return Some(Binding::External);
        };
        Some(self.parameter_named(&callables, name))
    }

    /// Program callables invoked by the argument list opening at `open`.
    /// `None` when the callee is not a program callable.
    fn callables_at(&self, tree: &SyntaxTree, unit: usize, open: usize) -> Option<Vec<SymbolId>> {
        if let Some(creation) = tree
            .creations
            .iter()
            .find(|c| c.args.is_some_and(|a| a.start == open))
        {
            let ty = self.creation_ty(unit, creation).program_type()?;
            return Some(self.constructors(ty));
        }
        if open == 0 {
            return None;
        }
        let callee = self.callee_token(tree, open)?;
        if tree.is_keyword(callee, "this") || tree.is_keyword(callee, "base") {
            let current = self.symbols.type_symbol(unit, tree.type_at(callee)?)?;
            let target = if tree.is_keyword(callee, "this") {
                current
            } else {
                self.class_base(current)?
            };
            return Some(self.constructors(target));
        }
        let id = self.bind(unit, callee).symbol()?;
        let symbol = self.symbols.get(id);
        match symbol.kind {
            SymbolKind::Type(_) => Some(self.constructors(id)),
            SymbolKind::LocalFunction => Some(vec![id]),
            kind if kind.is_callable() => {
                let parent = symbol.parent?;
                Some(
                    self.symbols
                        .get(parent)
                        .children(&symbol.name)
                        .iter()
                        .copied()
                        .filter(|c| self.symbols.get(*c).kind.is_callable())
                        .collect(),
                )
            }
            _ => None,
        }
    }

    /// Token naming the callee of the argument list at `open`, skipping a
    /// generic argument list.
    fn callee_token(&self, tree: &SyntaxTree, open: usize) -> Option<usize> {
        let before = open.checked_sub(1)?;
        if !tree.is_punct(before, ">") {
            return Some(before);
        }
        let mut depth = 0usize;
        let mut i = before;
        loop {
            if tree.is_punct(i, ">") {
                depth += 1;
            } else if tree.is_punct(i, "<") {
                depth -= 1;
                if depth == 0 {
                    return i.checked_sub(1);
                }
            } else if tree.is_punct(i, ";") || tree.is_punct(i, "{") {
                return None;
            }
            i = i.checked_sub(1)?;
        }
    }

    fn constructors(&self, ty: SymbolId) -> Vec<SymbolId> {
        let mut found = self.symbols.get(ty).children(".ctor").to_vec();
        found.push(ty);
        found
    }

    fn parameter_named(&self, callables: &[SymbolId], name: &str) -> Binding {
        callables
            .iter()
            .find_map(|c| self.symbols.parameters(*c, name).first().copied())
            .map_or(Binding::External, Binding::Symbol)
    }

    /// First program base class of a type.
    fn class_base(&self, ty: SymbolId) -> Option<SymbolId> {
        self.symbols
            .get(ty)
            .bases()
            .iter()
            .copied()
            .find(|b| self.symbols.get(*b).kind != SymbolKind::Type(TypeKind::Interface))
    }

    /// `new T { Name = value }`, `x with { Name = value }` and
    /// `[Attr(Name = value)]`.
    fn initializer_member(&self, tree: &SyntaxTree, unit: usize, token: usize, name: &str) -> Option<Binding> {
        if token == 0 || !tree.is_punct(token + 1, "=") {
            return None;
        }
        if !(tree.is_punct(token - 1, "{") || tree.is_punct(token - 1, ",") || tree.is_punct(token - 1, "(")) {
            return None;
        }
        let open = tree.enclosing_bracket(token)?;
        if tree.is_punct(open, "{") {
            if let Some(creation) = tree
                .creations
                .iter()
                .find(|c| c.init.is_some_and(|i| i.start == open))
            {
                if creation.type_ref.is_none() && creation.args.is_none() {
                    // Anonymous type members are not declared anywhere.
                    return Some(Binding::External);
                }
                let ty = self.creation_ty(unit, creation);
                return Some(self.member_of(&ty, name));
            }
            if open >= 2 && tree.ident(open - 1) == Some("with") {
                let receiver = self.infer(unit, open - 2);
                return Some(self.member_of(&receiver, name));
            }
            return None;
        }
        if tree.is_punct(open, "(") && tree.in_attribute(open) {
            let callee = open.checked_sub(1)?;
            return Some(match self.bind(unit, callee) {
                Binding::Symbol(id) => self.member_of(&Ty::Program(id), name),
                _ => Binding::External,
            });
        }
        None
    }

    fn simple_name(&self, tree: &SyntaxTree, unit: usize, token: usize, name: &str) -> Binding {
        if self.is_type_parameter(tree, unit, token, name) {
            return Binding::TypeParameter;
        }

        let local = tree
            .locals
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                l.name == name
                    && l.scope.contains(token)
                    && (l.name_token <= token || l.kind == LocalKind::Function)
            })
            .max_by_key(|(_, l)| l.name_token);
        if let Some((index, _)) = local {
            if let Some(id) = self.symbols.local_symbol(unit, index) {
                return Binding::Symbol(id);
            }
        }

        if let Some(member) = tree.member_at(token) {
            let params = tree.members[member].params;
            if let Some(index) = (params.start..params.end).find(|p| tree.params[*p].name == name) {
                if let Some(id) = self.symbols.param_symbol(unit, index) {
                    return Binding::Symbol(id);
                }
            }
        }

        let mut ty = tree.type_at(token);
        while let Some(t) = ty {
            let decl = &tree.types[t];
            if let Some(index) =
                (decl.params.start..decl.params.end).find(|p| tree.params[*p].name == name)
            {
                if let Some(id) = self.symbols.param_symbol(unit, index) {
                    return Binding::Symbol(id);
                }
            }
            if let Some(symbol) = self.symbols.type_symbol(unit, t) {
                if let Some(found) = self.symbols.lookup_member(symbol, name).first() {
                    return Binding::Symbol(*found);
                }
            }
            ty = decl.parent;
        }

        for directive in tree.usings.iter().filter(|d| d.is_static && d.alias.is_none()) {
            if let Some(target) = self.symbols.qualified_symbol(&directive.target_name) {
                if let Some(found) = self.symbols.lookup_member(target, name).first() {
                    return Binding::Symbol(*found);
                }
            }
        }

        self.symbols
            .lookup_type_name(self.program, unit, token, name)
            .map_or(Binding::External, |id| self.wrap(id))
    }

    fn is_type_parameter(&self, tree: &SyntaxTree, unit: usize, token: usize, name: &str) -> bool {
        let in_member = tree
            .member_at(token)
            .and_then(|m| self.symbols.member_symbol(unit, m))
            .is_some_and(|m| self.symbols.get(m).type_params().iter().any(|p| p == name));
        if in_member {
            return true;
        }
        let mut ty = tree.type_at(token);
        while let Some(t) = ty {
            if tree.types[t]
                .type_params
                .iter()
                .any(|p| tree.ident(*p) == Some(name))
            {
                return true;
            }
            ty = tree.types[t].parent;
        }
        // Generic local functions.
        tree.locals.iter().any(|l| {
            l.kind == LocalKind::Function
                && l.scope.contains(token)
                && tree.is_punct(l.name_token + 1, "<")
                && {
                    let mut k = l.name_token + 2;
                    let mut found = false;
                    while k < tree.tokens.len() && !tree.is_punct(k, ">") {
                        found |= tree.ident(k) == Some(name);
                        k += 1;
                    }
                    found
                }
        })
    }

    /// Binds `name` as a member of a value of type `receiver`.
    pub fn member_of(&self, receiver: &Ty, name: &str) -> Binding {
        match receiver {
            Ty::Program(id) | Ty::Static(id) => {
                if let Some(found) = self.symbols.lookup_member(*id, name).first() {
                    return Binding::Symbol(*found);
                }
                self.extension(name)
            }
            Ty::Generic(inner, _) => self.member_of(inner, name),
            Ty::Namespace(id) => self
                .symbols
                .get(*id)
                .children(name)
                .iter()
                .copied()
                .find(|c| {
                    matches!(
                        self.symbols.get(*c).kind,
                        SymbolKind::Type(_) | SymbolKind::Namespace
                    )
                })
                .map_or(Binding::External, |id| self.wrap(id)),
            Ty::Array(_) | Ty::External => self.extension(name),
            Ty::Unknown => Binding::Unbound,
        }
    }

    fn extension(&self, name: &str) -> Binding {
        self.symbols
            .extensions(name)
            .first()
            .map_or(Binding::External, |id| Binding::Symbol(*id))
    }

    /// Infers the type of the expression ending at token `end`.
    pub fn infer(&self, unit: usize, end: usize) -> Ty {
        let Some(tree) = self.tree(unit) else {
            return Ty::Unknown;
        };
        let Some(token) = tree.tokens.get(end) else {
            return Ty::Unknown;
        };
        let text = tree.token_text(end);
        match token.kind {
            TokenKind::Identifier => match self.bind(unit, end) {
                Binding::Symbol(id) => self.symbol_ty(id),
                Binding::Namespace(id) => Ty::Namespace(id),
                Binding::TypeParameter | Binding::External => Ty::External,
                Binding::Unbound => Ty::Unknown,
            },
            TokenKind::Keyword => match text {
                "this" => tree
                    .type_at(end)
                    .and_then(|t| self.symbols.type_symbol(unit, t))
                    .map_or(Ty::Unknown, Ty::Program),
                "base" => {
                    let Some(current) = tree
                        .type_at(end)
                        .and_then(|t| self.symbols.type_symbol(unit, t))
                    else {
                        return Ty::Unknown;
                    };
                    match self.class_base(current) {
                        Some(base) => Ty::Program(base),
                        None if self.symbols.get(current).has_external_base() => Ty::External,
                        None => Ty::Unknown,
                    }
                }
                word if PREDEFINED_TYPES.contains(&word) => Ty::External,
                _ => Ty::Unknown,
            },
            TokenKind::Punct => match text {
                ")" => self.infer_parenthesized(tree, unit, end),
                "]" => self.infer_element(tree, unit, end),
                "}" => tree
                    .creations
                    .iter()
                    .find(|c| c.range.end == end + 1)
                    .map_or(Ty::Unknown, |c| self.creation_ty(unit, c)),
                "!" if end > 0 => self.infer(unit, end - 1),
                _ => Ty::Unknown,
            },
            _ => Ty::External,
        }
    }

    fn infer_parenthesized(&self, tree: &SyntaxTree, unit: usize, close: usize) -> Ty {
        if let Some(creation) = tree.creations.iter().find(|c| c.range.end == close + 1) {
            return self.creation_ty(unit, creation);
        }
        let Some(open) = tree.pair(close) else {
            return Ty::Unknown;
        };
        if let Some(callee) = self.callee_token(tree, open) {
            if tree.ident(callee).is_some() {
                return match self.bind(unit, callee) {
                    Binding::Symbol(id) => self.return_ty(id),
                    Binding::External | Binding::TypeParameter => Ty::External,
                    _ => Ty::Unknown,
                };
            }
            if ["typeof", "nameof", "sizeof", "default", "checked", "unchecked"]
                .iter()
                .any(|w| tree.is_keyword(callee, w))
            {
                return Ty::External;
            }
            if tree.is_punct(callee, ")") || tree.is_punct(callee, "]") {
                // Delegate invocation.
                return Ty::Unknown;
            }
        }
        // `((T)x)`
        let inner = open + 1;
        if tree.is_punct(inner, "(") {
            if let Some(cast_close) = tree.pair(inner) {
                if cast_close + 1 < close {
                    if let Some((ty, next)) = parse_type(&tree.text, &tree.tokens, inner + 1, cast_close) {
                        if next == cast_close {
                            return self.ty_of(unit, inner + 1, &ty);
                        }
                    }
                }
            }
        }
        if close == 0 || close - 1 <= open {
            return Ty::Unknown;
        }
        self.infer_range(unit, TokenRange::new(open + 1, close))
    }

    fn infer_element(&self, tree: &SyntaxTree, unit: usize, close: usize) -> Ty {
        if let Some(creation) = tree.creations.iter().find(|c| c.range.end == close + 1) {
            return self.creation_ty(unit, creation);
        }
        let Some(open) = tree.pair(close) else {
            return Ty::Unknown;
        };
        let Some(before) = open.checked_sub(1) else {
            return Ty::Unknown;
        };
        let indexable = tree.ident(before).is_some()
            || tree.is_punct(before, ")")
            || tree.is_punct(before, "]")
            || tree.is_keyword(before, "this");
        if !indexable {
            return Ty::Unknown;
        }
        let base = self.infer(unit, before);
        self.element_ty(&base)
    }

    /// Infers the type of a whole expression range.
    pub fn infer_range(&self, unit: usize, range: TokenRange) -> Ty {
        let Some(tree) = self.tree(unit) else {
            return Ty::Unknown;
        };
        if range.is_empty() {
            return Ty::Unknown;
        }
        if tree.is_keyword(range.start, "new") {
            if let Some(creation) = tree
                .creations
                .iter()
                .find(|c| c.new_token == range.start && c.range.end == range.end)
            {
                return self.creation_ty(unit, creation);
            }
        }
        if tree.is_punct(range.start, "(") {
            if let Some(close) = tree.pair(range.start) {
                if close + 1 < range.end {
                    if let Some((ty, next)) = parse_type(&tree.text, &tree.tokens, range.start + 1, close) {
                        let operand = tree.tokens.get(close + 1).map(|t| t.kind);
                        if next == close
                            && matches!(
                                operand,
                                Some(TokenKind::Identifier | TokenKind::Keyword)
                            )
                        {
                            return self.ty_of(unit, range.start + 1, &ty);
                        }
                    }
                }
            }
        }
        if range.len() >= 3 {
            // `expr as T`
            let mut i = range.end - 1;
            while i > range.start && !tree.is_keyword(i, "as") {
                i -= 1;
            }
            if i > range.start {
                if let Some((ty, next)) = parse_type(&tree.text, &tree.tokens, i + 1, range.end) {
                    if next == range.end {
                        return self.ty_of(unit, i + 1, &ty);
                    }
                }
            }
        }
        if tree.is_keyword(range.start, "await") {
            return Ty::Unknown;
        }
        self.infer(unit, range.end - 1)
    }

    fn creation_ty(&self, unit: usize, creation: &Creation) -> Ty {
        let Some(ty) = &creation.type_ref else {
            return Ty::Unknown;
        };
        let inner = self.ty_of(unit, creation.new_token, ty);
        if creation.array && !ty.is_array() {
            Ty::Array(Box::new(inner))
        } else {
            inner
        }
    }

    fn element_ty(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::Array(inner) => (**inner).clone(),
            Ty::Generic(_, args) if args.len() == 1 => args[0].clone(),
            Ty::Program(id) => self
                .symbols
                .lookup_member(*id, "this[]")
                .first()
                .map_or(Ty::Unknown, |indexer| self.symbol_ty(*indexer)),
            Ty::Generic(..) | Ty::External => Ty::External,
            _ => Ty::Unknown,
        }
    }

    /// Converts type syntax written at token `at` into an inferred type.
    pub fn ty_of(&self, unit: usize, at: usize, ty: &TypeRef) -> Ty {
        if ty.is_tuple() {
            return Ty::External;
        }
        let base = if ty.keyword {
            Ty::External
        } else {
            match self.symbols.resolve_type(self.program, unit, at, ty) {
                Some(id) if self.symbols.get(id).kind.is_type() => Ty::Program(id),
                Some(_) => Ty::Unknown,
                None => Ty::External,
            }
        };
        let args = ty.args();
        let mut out = if args.is_empty() {
            base
        } else {
            Ty::Generic(
                Box::new(base),
                args.iter().map(|a| self.ty_of(unit, at, a)).collect(),
            )
        };
        for _ in 0..ty.array_ranks {
            out = Ty::Array(Box::new(out));
        }
        out
    }

    /// Type of a value produced by naming the symbol.
    pub fn symbol_ty(&self, id: SymbolId) -> Ty {
        let symbol = self.symbols.get(id);
        match symbol.kind {
            SymbolKind::Type(_) => Ty::Static(id),
            SymbolKind::Namespace => Ty::Namespace(id),
            SymbolKind::EnumMember => symbol.parent.map_or(Ty::Unknown, Ty::Program),
            kind if kind.is_value() || kind == SymbolKind::Indexer => self.declared_ty(id),
            _ => Ty::Unknown,
        }
    }

    /// Declared type of a value symbol, following `var` initializers.
    fn declared_ty(&self, id: SymbolId) -> Ty {
        let Some(origin) = self.symbols.get(id).origins.first().copied() else {
            return Ty::Unknown;
        };
        let Some(tree) = self.tree(origin.unit()) else {
            return Ty::Unknown;
        };
        match origin {
            Origin::Member { unit, decl } => {
                let member = &tree.members[decl];
                let at = member.name_token.unwrap_or(member.range.start);
                member
                    .type_ref
                    .as_ref()
                    .map_or(Ty::Unknown, |ty| self.ty_of(unit, at, ty))
            }
            Origin::Param { unit, decl } => {
                let param = &tree.params[decl];
                param
                    .type_ref
                    .as_ref()
                    .map_or(Ty::Unknown, |ty| self.ty_of(unit, param.name_token, ty))
            }
            Origin::Local { unit, decl } => {
                let local = &tree.locals[decl];
                if let Some(ty) = &local.type_ref {
                    return self.ty_of(unit, local.name_token, ty);
                }
                match (local.kind, local.init) {
                    (LocalKind::ForEach, Some(init)) => {
                        let collection = self.infer_range(unit, init);
                        self.element_ty(&collection)
                    }
                    (LocalKind::Variable | LocalKind::Using, Some(init)) => {
                        self.infer_range(unit, init)
                    }
                    _ => Ty::Unknown,
                }
            }
            _ => Ty::Unknown,
        }
    }

    /// Return type of invoking the symbol.
    fn return_ty(&self, id: SymbolId) -> Ty {
        let symbol = self.symbols.get(id);
        match symbol.kind {
            SymbolKind::Method | SymbolKind::LocalFunction => {
                let Some(origin) = symbol.origins.first().copied() else {
                    return Ty::Unknown;
                };
                let Some(tree) = self.tree(origin.unit()) else {
                    return Ty::Unknown;
                };
                match origin {
                    Origin::Member { unit, decl } => {
                        let member = &tree.members[decl];
                        let at = member.name_token.unwrap_or(member.range.start);
                        match &member.type_ref {
                            Some(ty) if ty.is_void() => Ty::Unknown,
                            Some(ty) => self.ty_of(unit, at, ty),
                            None => Ty::Unknown,
                        }
                    }
                    Origin::Local { unit, decl } => {
                        let local = &tree.locals[decl];
                        local
                            .type_ref
                            .as_ref()
                            .map_or(Ty::Unknown, |ty| self.ty_of(unit, local.name_token, ty))
                    }
                    _ => Ty::Unknown,
                }
            }
            SymbolKind::Type(TypeKind::Delegate) => Ty::Unknown,
            kind if kind.is_value() => {
                // Invoking a delegate-typed value.
                match self.declared_ty(id).program_type() {
                    Some(delegate) => self.delegate_return(delegate),
                    None => Ty::External,
                }
            }
            _ => Ty::Unknown,
        }
    }

    fn delegate_return(&self, delegate: SymbolId) -> Ty {
        let Some(Origin::Type { unit, decl }) = self.symbols.get(delegate).origins.first().copied() else {
            return Ty::Unknown;
        };
        let Some(tree) = self.tree(unit) else {
            return Ty::Unknown;
        };
        let decl = &tree.types[decl];
        match &decl.return_type {
            Some(ty) if !ty.is_void() => self.ty_of(unit, decl.name_token, ty),
            _ => Ty::Unknown,
        }
    }

    /// Local declared by the name token, if the token declares one.
    pub fn local_at(&self, unit: usize, token: usize) -> Option<usize> {
        let tree = self.tree(unit)?;
        tree.locals.iter().position(|l| l.name_token == token)
    }
}
