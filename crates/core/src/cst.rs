//! Concrete syntax tree front end.
//!
//! Units are parsed with the tree-sitter C# grammar. Everything downstream
//! addresses code by token index, so this module also maps node byte ranges
//! back onto the token stream.

use crate::syntax::{SyntaxTree, TokenRange};
use shroud_utils::errors::SyntaxError;
use tree_sitter::{Node, Parser, Tree};

pub(crate) fn parse(text: &str) -> Result<Tree, SyntaxError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_c_sharp::LANGUAGE.into())
        .map_err(|e| SyntaxError::Grammar(e.to_string()))?;
    parser
        .parse(text, None)
        .ok_or_else(|| SyntaxError::Grammar("parser produced no tree".to_string()))
}

/// First `ERROR` or missing node in document order.
pub(crate) fn first_error(text: &str, root: Node<'_>) -> Option<SyntaxError> {
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_missing() {
            return Some(SyntaxError::Missing {
                offset: node.start_byte(),
                expected: node.kind().to_string(),
            });
        }
        if node.is_error() {
            let found: String = text
                .get(node.byte_range())
                .unwrap_or_default()
                .chars()
                .take(24)
                .collect();
            return Some(SyntaxError::Invalid {
                offset: node.start_byte(),
                found: found.trim().to_string(),
            });
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

/// All children, comments excluded.
pub(crate) fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

pub(crate) fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    children(node).into_iter().find(|c| kinds.contains(&c.kind()))
}

/// The first of `fields` present on `node`.
pub(crate) fn field<'t>(node: Node<'t>, fields: &[&str]) -> Option<Node<'t>> {
    fields.iter().find_map(|f| node.child_by_field_name(f))
}

/// Every node under `root`, in pre-order.
pub(crate) fn descendants(root: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut cursor = root.walk();
    loop {
        nodes.push(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return nodes;
            }
        }
    }
}

/// Nearest ancestor whose kind is one of `kinds`.
pub(crate) fn ancestor<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return Some(parent);
        }
        current = parent.parent();
    }
    None
}

impl SyntaxTree {
    /// Index of the first token starting at or after `byte`.
    pub(crate) fn token_index(&self, byte: usize) -> usize {
        self.tokens.partition_point(|t| t.span.start < byte)
    }

    pub(crate) fn node_range(&self, node: Node<'_>) -> TokenRange {
        TokenRange::new(
            self.token_index(node.start_byte()),
            self.token_index(node.end_byte()),
        )
    }

    pub(crate) fn node_text(&self, node: Node<'_>) -> &str {
        self.text.get(node.byte_range()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_and_invalid_nodes() {
        let text = "class C { void M() { int x = 1 } }";
        let tree = parse(text).unwrap();
        assert!(matches!(
            first_error(text, tree.root_node()),
            Some(SyntaxError::Missing { .. } | SyntaxError::Invalid { .. })
        ));

        let text = "class C { void M() { int x = 1; } }";
        let tree = parse(text).unwrap();
        assert_eq!(first_error(text, tree.root_node()), None);
    }

    #[test]
    fn descendants_are_preorder() {
        let tree = parse("class C { }").unwrap();
        let kinds: Vec<_> = descendants(tree.root_node())
            .into_iter()
            .filter(|n| n.is_named())
            .map(|n| n.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["compilation_unit", "class_declaration", "identifier", "declaration_list"]
        );
    }
}
