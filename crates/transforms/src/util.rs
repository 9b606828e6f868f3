use shroud_core::lexer::{string_value, TokenKind};
use shroud_core::syntax::TokenRange;
use shroud_core::{SourceEdit, Span, SyntaxTree};

/// A string literal that may be replaced by an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LiteralSite {
    pub token: usize,
    pub span: Span,
    pub value: String,
    /// Inside an interpolation hole, where a bare `::` would read as a
    /// format separator.
    pub in_hole: bool,
}

impl LiteralSite {
    /// `call` as it must be spelled at this site.
    pub fn wrap(&self, call: String) -> String {
        if self.in_hole {
            format!("({call})")
        } else {
            call
        }
    }
}

/// Regular and verbatim string literals outside constant contexts and
/// attribute arguments, in token order.
///
/// Raw literals and literals whose value cannot be decoded are never
/// returned.
pub(crate) fn literal_sites(tree: &SyntaxTree) -> Vec<LiteralSite> {
    let mut sites = Vec::new();
    let mut depth = 0usize;
    for (index, token) in tree.tokens.iter().enumerate() {
        match token.kind {
            TokenKind::InterpolatedStart { .. } => depth += 1,
            TokenKind::InterpolatedEnd => depth = depth.saturating_sub(1),
            TokenKind::String { .. } => {
                if tree.in_constant_context(index) || tree.in_attribute(index) {
                    continue;
                }
                let Some(value) = string_value(&tree.text, token) else {
                    continue;
                };
                sites.push(LiteralSite {
                    token: index,
                    span: token.span,
                    value,
                    in_hole: depth > 0,
                });
            }
            _ => {}
        }
    }
    sites
}

/// Top-level comma-separated pieces of an argument list `( ... )`.
pub(crate) fn split_args(tree: &SyntaxTree, args: TokenRange) -> Vec<TokenRange> {
    let mut pieces = Vec::new();
    let inner_end = args.end.saturating_sub(1);
    let mut start = args.start + 1;
    let mut j = start;
    while j < inner_end {
        if tree.is_punct(j, ",") {
            pieces.push(TokenRange::new(start, j));
            start = j + 1;
        } else if let Some(close) = tree.pair(j).filter(|&c| c > j) {
            j = close;
        }
        j += 1;
    }
    if start < inner_end {
        pieces.push(TokenRange::new(start, inner_end));
    }
    pieces
}

/// Text of `span` with every edit lying inside it applied.
///
/// Used when an outer replacement has to carry edits planned for the text
/// it swallows.
pub(crate) fn render_span(text: &str, span: Span, edits: &[SourceEdit]) -> String {
    let mut inner: Vec<&SourceEdit> = edits.iter().filter(|e| span.encloses(&e.span)).collect();
    inner.sort_by_key(|e| (e.span.start, e.span.end));
    let mut out = String::with_capacity(span.len());
    let mut cursor = span.start;
    for edit in inner {
        if edit.span.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..edit.span.start]);
        out.push_str(&edit.replacement);
        cursor = edit.span.end;
    }
    out.push_str(&text[cursor..span.end]);
    out
}
