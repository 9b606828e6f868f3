//! Token stream over the leaves of a parsed C# unit.
//!
//! Trivia (whitespace, comments, preprocessor lines) is dropped; every other
//! byte of the input belongs to exactly one token span, so rewrites can be
//! expressed as span replacements over the original text. String literals
//! stay whole, and interpolated strings are split around their holes.

use std::ops::Range;

use crate::cst;
use crate::edit::Span;
use shroud_utils::errors::SyntaxError;
use tree_sitter::Node;

/// Reserved words of the language. Contextual keywords lex as identifiers.
pub const KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Whether `name` can be written as a plain (non-`@`) identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {}
        _ => return false,
    }
    chars.all(is_ident_continue) && !is_keyword(name)
}

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

pub fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Length of a string as the target runtime measures it (UTF-16 code units).
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    Char,
    /// Regular or verbatim string literal.
    String { verbatim: bool },
    /// Raw (`"""`) or raw-interpolated literal. Never rewritten.
    RawString,
    /// Opening `$"`, `$@"` or `@$"` of an interpolated string.
    InterpolatedStart { verbatim: bool },
    /// Literal text or a format specifier inside an interpolated string.
    InterpolatedText,
    /// Closing quote of an interpolated string.
    InterpolatedEnd,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }

    /// Identifier text with any leading `@` removed.
    pub fn ident<'a>(&self, source: &'a str) -> &'a str {
        let text = self.text(source);
        text.strip_prefix('@').unwrap_or(text)
    }

    pub const fn is_ident(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier)
    }

    pub fn is_punct(&self, source: &str, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(source) == punct
    }

    pub fn is_keyword(&self, source: &str, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text(source) == word
    }

    pub const fn is_string(&self) -> bool {
        matches!(self.kind, TokenKind::String { .. })
    }
}

/// Splits `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let parsed = cst::parse(source)?;
    let root = parsed.root_node();
    if let Some(error) = cst::first_error(source, root) {
        return Err(error);
    }
    Ok(leaves(source, root))
}

/// Tokens of an already parsed unit.
pub(crate) fn leaves(source: &str, root: Node<'_>) -> Vec<Token> {
    let mut lexer = Lexer {
        src: source,
        directives: directive_lines(source),
        tokens: Vec::new(),
    };
    lexer.collect(root);
    lexer.tokens
}

/// Byte ranges of preprocessor directive lines.
fn directive_lines(source: &str) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if trimmed.starts_with('#') {
            lines.push(start..start + line.len());
        }
        start += line.len();
    }
    lines
}

struct Lexer<'a> {
    src: &'a str,
    directives: Vec<Range<usize>>,
    tokens: Vec<Token>,
}

impl Lexer<'_> {
    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn in_directive(&self, byte: usize) -> bool {
        let i = self.directives.partition_point(|r| r.end <= byte);
        self.directives.get(i).is_some_and(|r| r.contains(&byte))
    }

    /// Walks the subtree under `node`, emitting its tokens.
    fn collect(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let mut depth = 0usize;
        loop {
            if self.visit(cursor.node()) && cursor.goto_first_child() {
                depth += 1;
                continue;
            }
            loop {
                if depth == 0 {
                    return;
                }
                if cursor.goto_next_sibling() {
                    break;
                }
                cursor.goto_parent();
                depth -= 1;
            }
        }
    }

    /// Emits the node if it is atomic. Returns whether to descend.
    fn visit(&mut self, node: Node<'_>) -> bool {
        let (start, end) = (node.start_byte(), node.end_byte());
        if node.is_missing() || start == end {
            return false;
        }
        let atomic = match node.kind() {
            "comment" => return false,
            "string_literal" => TokenKind::String { verbatim: false },
            "verbatim_string_literal" => TokenKind::String { verbatim: true },
            "raw_string_literal" => TokenKind::RawString,
            "character_literal" => TokenKind::Char,
            "interpolated_string_expression" => {
                self.interpolated(node);
                return false;
            }
            _ if node.child_count() == 0 => {
                self.leaf(start, end);
                return false;
            }
            _ => return true,
        };
        if !self.in_directive(start) {
            self.push(atomic, start, end);
        }
        false
    }

    fn leaf(&mut self, start: usize, end: usize) {
        if self.in_directive(start) {
            return;
        }
        let text = &self.src[start..end];
        let mut chars = text.chars();
        let kind = match (chars.next(), chars.next()) {
            (Some('@'), Some(c)) if is_ident_start(c) => TokenKind::Identifier,
            (Some(c), _) if is_ident_start(c) => {
                if is_keyword(text) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                }
            }
            (Some(c), _) if c.is_ascii_digit() => TokenKind::Number,
            (Some('.'), Some(c)) if c.is_ascii_digit() => TokenKind::Number,
            (Some(_), _) => TokenKind::Punct,
            (None, _) => return,
        };
        self.push(kind, start, end);
    }

    fn text(&mut self, start: usize, end: usize) {
        if end > start {
            self.push(TokenKind::InterpolatedText, start, end);
        }
    }

    /// `$"..."`: the opening, literal runs and holes become separate tokens.
    fn interpolated(&mut self, node: Node<'_>) {
        let (start, end) = (node.start_byte(), node.end_byte());
        let text = &self.src[start..end];
        let prefix = text.bytes().take_while(|b| *b == b'$' || *b == b'@').count();
        let dollars = text[..prefix].matches('$').count();
        let quotes = text[prefix..].bytes().take_while(|b| *b == b'"').count();
        if dollars > 1 || (quotes >= 3 && text.len() > prefix + quotes) {
            self.push(TokenKind::RawString, start, end);
            return;
        }
        let verbatim = text[..prefix].contains('@');
        let open = start + prefix + 1;
        let close = end.saturating_sub(1).max(open);
        self.push(TokenKind::InterpolatedStart { verbatim }, start, open);
        let mut text_start = open;
        for child in cst::children(node) {
            if child.kind() != "interpolation" {
                continue;
            }
            self.text(text_start, child.start_byte());
            self.hole(child);
            text_start = child.end_byte();
        }
        self.text(text_start, close);
        self.push(TokenKind::InterpolatedEnd, close, end);
    }

    fn hole(&mut self, node: Node<'_>) {
        for part in cst::children(node) {
            if part.kind() == "interpolation_format_clause" {
                let colon = part.start_byte();
                self.push(TokenKind::Punct, colon, colon + 1);
                self.text(colon + 1, part.end_byte());
            } else {
                self.collect(part);
            }
        }
    }
}

/// Decoded value of a regular or verbatim string literal token.
///
/// Returns `None` for other tokens and for literals whose value is not valid
/// Unicode (an unpaired surrogate escape).
pub fn string_value(source: &str, token: &Token) -> Option<String> {
    let TokenKind::String { verbatim } = token.kind else {
        return None;
    };
    let text = token.text(source);
    if verbatim {
        let body = text.strip_prefix("@\"")?.strip_suffix('"')?;
        return Some(body.replace("\"\"", "\""));
    }
    let body = text.strip_prefix('"')?.strip_suffix('"')?;
    decode_escapes(body)
}

fn decode_escapes(body: &str) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let escaped = chars.next()?;
        let unit = match escaped {
            '\'' => 0x27,
            '"' => 0x22,
            '\\' => 0x5c,
            '0' => 0,
            'a' => 0x07,
            'b' => 0x08,
            'e' => 0x1b,
            'f' => 0x0c,
            'n' => 0x0a,
            'r' => 0x0d,
            't' => 0x09,
            'v' => 0x0b,
            'u' => hex_digits(&mut chars, 4, 4)?,
            'x' => hex_digits(&mut chars, 1, 4)?,
            'U' => {
                let value = hex_digits(&mut chars, 8, 8)?;
                let c = char::from_u32(value)?;
                let mut buf = [0u16; 2];
                units.extend_from_slice(c.encode_utf16(&mut buf));
                continue;
            }
            _ => return None,
        };
        units.push(u16::try_from(unit).ok()?);
    }
    String::from_utf16(&units).ok()
}

fn hex_digits(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    min: usize,
    max: usize,
) -> Option<u32> {
    let mut value = 0u32;
    let mut count = 0;
    while count < max {
        let Some(digit) = chars.peek().and_then(|c| c.to_digit(16)) else {
            break;
        };
        chars.next();
        value = value * 16 + digit;
        count += 1;
    }
    (count >= min).then_some(value)
}

/// Renders `value` as a regular string literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src).unwrap().iter().map(|t| t.text(src)).collect()
    }

    fn string_token(src: &str) -> Token {
        tokenize(src)
            .unwrap()
            .into_iter()
            .find(|t| t.is_string())
            .unwrap()
    }

    #[test]
    fn skips_trivia_and_preprocessor_lines() {
        let src = "#region x\n// note\nclass /* c */ A {}\n#endregion";
        assert_eq!(texts(src), vec!["class", "A", "{", "}"]);
    }

    #[test]
    fn conditional_blocks_keep_their_code() {
        let src = "#if DEBUG\nclass A {}\n#endif\n";
        assert_eq!(texts(src), vec!["class", "A", "{", "}"]);
    }

    #[test]
    fn generic_closers_lex_separately() {
        let src = "class C { List<List<int>> x; }";
        assert_eq!(
            texts(src)[3..12],
            ["List", "<", "List", "<", "int", ">", ">", "x", ";"]
        );
    }

    #[test]
    fn escaped_identifier_keeps_at_in_span() {
        let src = "class C { int @class = 1; }";
        let tokens = tokenize(src).unwrap();
        assert_eq!(tokens[4].kind, TokenKind::Identifier);
        assert_eq!(tokens[4].text(src), "@class");
        assert_eq!(tokens[4].ident(src), "class");
    }

    #[test]
    fn interpolation_holes_are_tokens() {
        let src = r#"class C { string s = $"Hi {user.Name,5:N0} {{x}}"; }"#;
        let tokens = tokenize(src).unwrap();
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.is_ident())
            .map(|t| t.text(src))
            .collect();
        assert_eq!(idents, vec!["C", "s", "user", "Name"]);
        let format = tokens
            .iter()
            .position(|t| t.kind == TokenKind::InterpolatedText && t.text(src) == "N0")
            .unwrap();
        assert!(tokens[format - 1].is_punct(src, ":"));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::InterpolatedEnd));
    }

    #[test]
    fn nested_strings_inside_holes() {
        let src = r#"class C { string s = $"{Get("a}")}"; }"#;
        let tokens = tokenize(src).unwrap();
        assert!(tokens.iter().any(|t| t.is_string() && t.text(src) == "\"a}\""));
    }

    #[test]
    fn raw_strings_are_opaque() {
        let src = "class C { string s = \"\"\"\n  \"quoted\" \n  \"\"\"; }";
        let tokens = tokenize(src).unwrap();
        assert_eq!(tokens[6].kind, TokenKind::RawString);
        assert_eq!(tokens.len(), 9);
    }

    #[test]
    fn decodes_regular_and_verbatim_values() {
        let src = r#"class C { void M() { a("x\ty\u0041\"", @"c:\dir ""q"""); } }"#;
        let tokens = tokenize(src).unwrap();
        let values: Vec<_> = tokens.iter().filter_map(|t| string_value(src, t)).collect();
        assert_eq!(values, vec!["x\tyA\"".to_string(), "c:\\dir \"q\"".to_string()]);
    }

    #[test]
    fn lone_surrogate_has_no_value() {
        let src = r#"class C { string s = "\uD800"; }"#;
        assert_eq!(string_value(src, &string_token(src)), None);
        let pair = r#"class C { string s = "\uD83D\uDE00"; }"#;
        assert_eq!(
            string_value(pair, &string_token(pair)).as_deref(),
            Some("\u{1F600}")
        );
    }

    #[test]
    fn unterminated_literals_are_errors() {
        assert!(tokenize("class C { string s = \"abc\n; }").is_err());
        assert!(tokenize("class C { } /* open").is_err());
    }

    #[test]
    fn quote_literal_round_trips_through_decoder() {
        let value = "line\n\"quoted\" \\ tab\t";
        let src = format!("class C {{ string s = {}; }}", quote_literal(value));
        assert_eq!(string_value(&src, &string_token(&src)).as_deref(), Some(value));
    }

    #[test]
    fn identifier_validity() {
        assert!(is_identifier("Widget_2"));
        assert!(!is_identifier("2Widget"));
        assert!(!is_identifier("class"));
        assert!(!is_identifier(""));
        assert_eq!(utf16_len("a\u{1F600}"), 3);
    }
}
