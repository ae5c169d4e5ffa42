use anyhow::Result;
use tree_sitter::{Language, Node as TSNode, Parser, Tree, TreeCursor};

pub struct TreeSitterParser {
    parser: Parser,
}

impl TreeSitterParser {
    pub fn new(language: Language) -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(language)?;
        Ok(Self { parser })
    }

    pub fn parse_source(&mut self, source: &str) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("tree-sitter produced no tree"))
    }
}

pub fn extract_text<'a>(node: &TSNode, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.byte_range()]).unwrap_or("")
}

/// Contents of a string or template literal without its quotes; `None` for
/// templates containing substitutions.
pub fn string_literal_value(node: &TSNode, source: &[u8]) -> Option<String> {
    match node.kind() {
        "string" => Some(
            extract_text(node, source)
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string(),
        ),
        "template_string" => {
            if find_child_by_kind(node, "template_substitution").is_some() {
                return None;
            }
            Some(extract_text(node, source).trim_matches('`').to_string())
        }
        _ => None,
    }
}

pub fn find_child_by_kind<'a>(node: &TSNode<'a>, kind: &str) -> Option<TSNode<'a>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|child| child.kind() == kind);
    found
}

/// Pre-order walk over every node below the cursor's position.
pub fn visit_nodes<'tree, F>(cursor: &mut TreeCursor<'tree>, mut callback: F)
where
    F: FnMut(TSNode<'tree>),
{
    loop {
        callback(cursor.node());

        if cursor.goto_first_child() {
            continue;
        }

        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// First line of a statement, used as `raw_text`.
pub fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}
