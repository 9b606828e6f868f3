//! Type syntax as it appears in declarations and expressions.

use crate::lexer::{Token, TokenKind};
use crate::syntax::TokenRange;

/// Built-in type keywords.
pub const PREDEFINED_TYPES: &[&str] = &[
    "bool", "byte", "char", "decimal", "double", "float", "int", "long", "object", "sbyte",
    "short", "string", "uint", "ulong", "ushort", "void",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSegment {
    pub token: usize,
    pub name: String,
    pub args: Vec<TypeRef>,
}

/// A parsed type reference such as `global::Ns.List<int>[]?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub range: TokenRange,
    /// Alias qualifier before `::`, e.g. `global`.
    pub alias: Option<String>,
    pub segments: Vec<TypeSegment>,
    /// Element types of a tuple type. Empty otherwise.
    pub tuple: Vec<TypeRef>,
    pub array_ranks: usize,
    pub nullable: bool,
    pub pointer: bool,
    /// Whether this is a predefined keyword type.
    pub keyword: bool,
}

impl TypeRef {
    /// Dotted name without type arguments, e.g. `System.IO.Stream`.
    pub fn qualified_name(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn simple_name(&self) -> &str {
        self.segments.last().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Type arguments of the last segment.
    pub fn args(&self) -> &[TypeRef] {
        self.segments.last().map(|s| s.args.as_slice()).unwrap_or(&[])
    }

    pub fn is_var(&self) -> bool {
        !self.keyword
            && self.alias.is_none()
            && self.array_ranks == 0
            && self.segments.len() == 1
            && self.segments[0].name == "var"
            && self.segments[0].args.is_empty()
    }

    pub fn is_void(&self) -> bool {
        self.keyword && self.simple_name() == "void" && !self.pointer
    }

    pub fn is_array(&self) -> bool {
        self.array_ranks > 0
    }

    pub fn is_tuple(&self) -> bool {
        !self.tuple.is_empty()
    }

    /// Whether values of this type need `default(T)` rather than `new T()`.
    pub fn lacks_default_constructor(&self) -> bool {
        self.is_array()
            || self.pointer
            || (self.keyword && matches!(self.simple_name(), "string" | "object"))
    }

    /// Source text of the reference.
    pub fn text<'a>(&self, source: &'a str, tokens: &[Token]) -> &'a str {
        match (tokens.get(self.range.start), tokens.get(self.range.end.wrapping_sub(1))) {
            (Some(first), Some(last)) if self.range.end > self.range.start => {
                &source[first.span.start..last.span.end]
            }
            _ => "",
        }
    }
}

/// Parses a type starting at token `i`, stopping before `end`.
///
/// Returns the type and the index of the first token after it. The parse is
/// speculative: `None` means the tokens do not form a type here.
pub fn parse_type(source: &str, tokens: &[Token], i: usize, end: usize) -> Option<(TypeRef, usize)> {
    TypeParser {
        src: source,
        tokens,
        end: end.min(tokens.len()),
    }
    .parse(i, 0)
}

struct TypeParser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    end: usize,
}

impl TypeParser<'_> {
    fn punct(&self, i: usize, p: &str) -> bool {
        i < self.end && self.tokens[i].is_punct(self.src, p)
    }

    fn ident(&self, i: usize) -> Option<&str> {
        (i < self.end && self.tokens[i].kind == TokenKind::Identifier)
            .then(|| self.tokens[i].ident(self.src))
    }

    fn parse(&self, start: usize, depth: usize) -> Option<(TypeRef, usize)> {
        if depth > 16 || start >= self.end {
            return None;
        }
        let mut ty = TypeRef {
            range: TokenRange::new(start, start),
            alias: None,
            segments: Vec::new(),
            tuple: Vec::new(),
            array_ranks: 0,
            nullable: false,
            pointer: false,
            keyword: false,
        };
        let mut i = start;
        let token = self.tokens[i];

        if self.punct(i, "(") {
            i += 1;
            loop {
                let (elem, next) = self.parse(i, depth + 1)?;
                ty.tuple.push(elem);
                i = next;
                if self.ident(i).is_some() {
                    i += 1;
                }
                if self.punct(i, ",") {
                    i += 1;
                } else if self.punct(i, ")") {
                    i += 1;
                    break;
                } else {
                    return None;
                }
            }
            if ty.tuple.len() < 2 {
                return None;
            }
        } else if token.kind == TokenKind::Keyword
            && PREDEFINED_TYPES.contains(&token.text(self.src))
        {
            ty.keyword = true;
            ty.segments.push(TypeSegment {
                token: i,
                name: token.text(self.src).to_string(),
                args: Vec::new(),
            });
            i += 1;
        } else if let Some(first) = self.ident(i) {
            if self.punct(i + 1, "::") && self.ident(i + 2).is_some() {
                ty.alias = Some(first.to_string());
                i += 2;
            }
            loop {
                let name = self.ident(i)?.to_string();
                let token_index = i;
                i += 1;
                let mut args = Vec::new();
                if self.punct(i, "<") {
                    if let Some((parsed, next)) = self.type_args(i, depth) {
                        args = parsed;
                        i = next;
                    }
                }
                ty.segments.push(TypeSegment {
                    token: token_index,
                    name,
                    args,
                });
                if self.punct(i, ".") && self.ident(i + 1).is_some() {
                    i += 1;
                } else {
                    break;
                }
            }
        } else {
            return None;
        }

        loop {
            if self.punct(i, "?") {
                ty.nullable = true;
                i += 1;
            } else if self.punct(i, "*") {
                ty.pointer = true;
                i += 1;
            } else if self.punct(i, "[") {
                let mut j = i + 1;
                while self.punct(j, ",") {
                    j += 1;
                }
                if !self.punct(j, "]") {
                    break;
                }
                ty.array_ranks += 1;
                i = j + 1;
            } else {
                break;
            }
        }
        ty.range = TokenRange::new(start, i);
        Some((ty, i))
    }

    /// `<T, U>` or the unbound form `<,>`.
    fn type_args(&self, open: usize, depth: usize) -> Option<(Vec<TypeRef>, usize)> {
        let mut i = open + 1;
        if self.punct(i, ">") || self.punct(i, ",") {
            while self.punct(i, ",") {
                i += 1;
            }
            return self.punct(i, ">").then_some((Vec::new(), i + 1));
        }
        let mut args = Vec::new();
        loop {
            let (arg, next) = self.parse(i, depth + 1)?;
            args.push(arg);
            i = next;
            if self.punct(i, ",") {
                i += 1;
            } else if self.punct(i, ">") {
                return Some((args, i + 1));
            } else {
                return None;
            }
        }
    }
}
