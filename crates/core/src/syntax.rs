//! Declaration-level syntax tree for one compilation unit.
//!
//! The tree never owns rewritten structure: it is a read-only index over the
//! unit's token stream, rebuilt from text after every rewrite.

use crate::edit::Span;
use crate::lexer::{Token, TokenKind};
use crate::parser;
use crate::types::TypeRef;
use shroud_utils::errors::SyntaxError;

/// Half-open range of token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TokenRange {
    pub start: usize,
    pub end: usize,
}

impl TokenRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    ExternAlias,
    Using,
    GlobalAttribute,
    Namespace { file_scoped: bool },
    Type,
    /// Top-level statements and anything else not understood.
    Other,
}

/// A compilation-unit level item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kind: ItemKind,
    pub range: TokenRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingDirective {
    pub range: TokenRange,
    pub is_global: bool,
    pub is_static: bool,
    pub alias: Option<usize>,
    /// Tokens of the imported name (or aliased type).
    pub target: TokenRange,
    pub target_name: String,
    /// Enclosing namespace declaration, `None` at compilation-unit level.
    pub namespace: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub range: TokenRange,
    /// Identifier tokens of the declared (possibly dotted) name.
    pub name_tokens: Vec<usize>,
    /// Declared name as written.
    pub name: String,
    /// Name including all enclosing namespace declarations.
    pub full_name: String,
    pub file_scoped: bool,
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
    Record,
    RecordStruct,
    Delegate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub kind: TypeKind,
    pub range: TokenRange,
    pub name_token: usize,
    pub name: String,
    pub type_params: Vec<usize>,
    pub modifiers: Vec<String>,
    pub bases: Vec<TypeRef>,
    pub attributes: Vec<usize>,
    pub parent: Option<usize>,
    /// Fully-qualified enclosing namespace, empty for the global namespace.
    pub namespace: String,
    /// Brace pair of the body.
    pub body: Option<TokenRange>,
    /// Delegate signature return type.
    pub return_type: Option<TypeRef>,
    /// Delegate or primary-constructor parameters (indices into `params`).
    pub params: TokenRange,
}

impl TypeDecl {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Constructor,
    Destructor,
    Property,
    Indexer,
    Operator,
    Conversion,
    Field,
    Const,
    Event,
    EnumMember,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDecl {
    pub kind: MemberKind,
    pub owner: usize,
    pub range: TokenRange,
    pub name_token: Option<usize>,
    pub name: String,
    pub type_ref: Option<TypeRef>,
    pub modifiers: Vec<String>,
    pub explicit_interface: Option<TypeRef>,
    pub type_params: Vec<usize>,
    pub attributes: Vec<usize>,
    /// Indices into `params`.
    pub params: TokenRange,
    /// Bracket pair of the parameter list.
    pub param_list: Option<TokenRange>,
    /// Everything after the signature that holds code.
    pub body: Option<TokenRange>,
}

impl MemberDecl {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamModifier {
    Ref,
    Out,
    In,
    Params,
    This,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamOwner {
    Member(usize),
    /// Delegate or primary-constructor parameters of a type.
    Type(usize),
    /// Parameters of a local function declared by the given local.
    LocalFunction(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub owner: ParamOwner,
    pub range: TokenRange,
    pub name_token: usize,
    pub name: String,
    pub type_ref: Option<TypeRef>,
    pub modifiers: Vec<ParamModifier>,
    pub attributes: Vec<usize>,
    pub default: Option<TokenRange>,
}

impl ParamDecl {
    pub fn has_modifier(&self, modifier: ParamModifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Variable,
    Const,
    Using,
    ForEach,
    Catch,
    Out,
    Pattern,
    Lambda,
    Query,
    Deconstruction,
    Function,
    FunctionParam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub kind: LocalKind,
    pub name_token: usize,
    pub name: String,
    /// Declared type. `None` when implicitly typed.
    pub type_ref: Option<TypeRef>,
    /// Initializer expression, or the collection of a `foreach`.
    pub init: Option<TokenRange>,
    /// Tokens where the name is visible.
    pub scope: TokenRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creation {
    pub new_token: usize,
    /// Constructed type. `None` for target-typed and anonymous creations.
    pub type_ref: Option<TypeRef>,
    pub args: Option<TokenRange>,
    pub init: Option<TokenRange>,
    pub array: bool,
    /// The whole expression.
    pub range: TokenRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: TypeRef,
    /// Bracket pair of the argument list.
    pub args: Option<TokenRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeList {
    pub range: TokenRange,
    pub target: Option<String>,
    pub attributes: Vec<Attribute>,
}

/// Parsed compilation unit.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub text: String,
    pub tokens: Vec<Token>,
    /// Matching bracket index for every `(`, `[`, `{` and their closers.
    pub pairs: Vec<Option<usize>>,
    pub items: Vec<Item>,
    pub usings: Vec<UsingDirective>,
    pub namespaces: Vec<NamespaceDecl>,
    pub types: Vec<TypeDecl>,
    pub members: Vec<MemberDecl>,
    pub params: Vec<ParamDecl>,
    pub locals: Vec<LocalDecl>,
    pub creations: Vec<Creation>,
    pub attributes: Vec<AttributeList>,
    /// Token ranges whose expressions must stay compile-time constants.
    pub constant_ranges: Vec<TokenRange>,
    /// Brace pairs of switch expressions.
    pub switch_expressions: Vec<TokenRange>,
    pub(crate) type_of_token: Vec<Option<usize>>,
    pub(crate) member_of_token: Vec<Option<usize>>,
    pub(crate) namespace_of_token: Vec<Option<usize>>,
}

impl SyntaxTree {
    pub fn parse(text: impl Into<String>) -> Result<Self, SyntaxError> {
        parser::parse(text.into())
    }

    pub fn token_text(&self, index: usize) -> &str {
        self.tokens
            .get(index)
            .map(|t| t.text(&self.text))
            .unwrap_or("")
    }

    /// Identifier text without `@`, or `None` for non-identifiers.
    pub fn ident(&self, index: usize) -> Option<&str> {
        self.tokens
            .get(index)
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.ident(&self.text))
    }

    pub fn is_punct(&self, index: usize, punct: &str) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|t| t.is_punct(&self.text, punct))
    }

    pub fn is_keyword(&self, index: usize, word: &str) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|t| t.is_keyword(&self.text, word))
    }

    pub fn pair(&self, index: usize) -> Option<usize> {
        self.pairs.get(index).copied().flatten()
    }

    /// Byte span covered by a token range.
    pub fn span(&self, range: TokenRange) -> Span {
        match (self.tokens.get(range.start), range.end.checked_sub(1).and_then(|i| self.tokens.get(i))) {
            (Some(first), Some(last)) if range.end > range.start => {
                Span::new(first.span.start, last.span.end)
            }
            (Some(first), _) => Span::at(first.span.start),
            _ => Span::at(self.text.len()),
        }
    }

    pub fn slice(&self, range: TokenRange) -> &str {
        let span = self.span(range);
        &self.text[span.start..span.end]
    }

    pub fn type_text(&self, ty: &TypeRef) -> &str {
        ty.text(&self.text, &self.tokens)
    }

    /// Innermost type declaration containing the token.
    pub fn type_at(&self, index: usize) -> Option<usize> {
        self.type_of_token.get(index).copied().flatten()
    }

    /// Member declaration containing the token.
    pub fn member_at(&self, index: usize) -> Option<usize> {
        self.member_of_token.get(index).copied().flatten()
    }

    /// Innermost namespace declaration containing the token.
    pub fn namespace_at(&self, index: usize) -> Option<usize> {
        self.namespace_of_token.get(index).copied().flatten()
    }

    /// Full name of the namespace enclosing the token.
    pub fn namespace_name_at(&self, index: usize) -> &str {
        self.namespace_at(index)
            .map(|ns| self.namespaces[ns].full_name.as_str())
            .unwrap_or("")
    }

    pub fn in_constant_context(&self, index: usize) -> bool {
        self.constant_ranges.iter().any(|r| r.contains(index))
    }

    pub fn in_attribute(&self, index: usize) -> bool {
        self.attributes.iter().any(|a| a.range.contains(index))
    }

    /// Whether the unit uses a file-scoped namespace declaration.
    pub fn has_file_scoped_namespace(&self) -> bool {
        self.namespaces.iter().any(|ns| ns.file_scoped)
    }

    /// Index of the bracket that most closely encloses the token.
    pub fn enclosing_bracket(&self, index: usize) -> Option<usize> {
        let mut depth = 0usize;
        for i in (0..index).rev() {
            let token = &self.tokens[i];
            if token.kind != TokenKind::Punct {
                continue;
            }
            match token.text(&self.text) {
                ")" | "]" | "}" => depth += 1,
                "(" | "[" | "{" => {
                    if depth == 0 {
                        return Some(i);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        None
    }

    /// Whether the identifier token is the name of a member access
    /// (`x.Name`, `x?.Name`, `p->Name`).
    pub fn is_member_access_name(&self, index: usize) -> bool {
        index > 0
            && (self.is_punct(index - 1, ".")
                || self.is_punct(index - 1, "?.")
                || self.is_punct(index - 1, "->"))
    }
}
