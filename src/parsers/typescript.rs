use anyhow::Result;
use std::path::Path;
use tree_sitter::{Language, Node as TSNode};

use super::common::{
    extract_text, find_child_by_kind, first_line, string_literal_value, visit_nodes,
    TreeSitterParser,
};
use super::StatementExtractor;
use crate::core::types::{ImportStatement, Specifier, StatementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Grammar {
    fn for_extension(extension: &str) -> Option<Self> {
        match extension {
            "ts" | "mts" | "cts" => Some(Grammar::TypeScript),
            "tsx" => Some(Grammar::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Grammar::JavaScript),
            _ => None,
        }
    }

    fn language(self) -> Language {
        match self {
            Grammar::TypeScript => tree_sitter_typescript::language_typescript(),
            Grammar::Tsx => tree_sitter_typescript::language_tsx(),
            Grammar::JavaScript => tree_sitter_javascript::language(),
        }
    }
}

/// Import/require/dynamic-import/re-export extraction for the JavaScript
/// family, backed by tree-sitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeScriptExtractor;

impl TypeScriptExtractor {
    pub fn new() -> Self {
        Self
    }

    fn process_import(&self, node: &TSNode, source: &[u8]) -> Option<ImportStatement> {
        let line_number = node.start_position().row + 1;
        let raw_text = first_line(extract_text(node, source));

        if let Some(source_node) = node.child_by_field_name("source") {
            let literal = string_literal_value(&source_node, source)?;
            let specifiers = find_child_by_kind(node, "import_clause")
                .map(|clause| self.import_clause_specifiers(&clause, source))
                .unwrap_or_default();

            return Some(
                ImportStatement::new(StatementKind::Import, literal, line_number)
                    .with_specifiers(specifiers)
                    .with_raw_text(raw_text),
            );
        }

        // TypeScript `import x = require("y")`
        let clause = find_child_by_kind(node, "import_require_clause")?;
        let source_node = clause
            .child_by_field_name("source")
            .or_else(|| find_child_by_kind(&clause, "string"))?;
        let literal = string_literal_value(&source_node, source)?;
        let specifiers = find_child_by_kind(&clause, "identifier")
            .map(|ident| Specifier::default_import(extract_text(&ident, source)))
            .into_iter()
            .collect();

        Some(
            ImportStatement::new(StatementKind::Require, literal, line_number)
                .with_specifiers(specifiers)
                .with_raw_text(raw_text),
        )
    }

    fn import_clause_specifiers(&self, clause: &TSNode, source: &[u8]) -> Vec<Specifier> {
        let mut specifiers = Vec::new();
        let mut cursor = clause.walk();

        for child in clause.children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    specifiers.push(Specifier::default_import(extract_text(&child, source)));
                }
                "namespace_import" => {
                    if let Some(ident) = find_child_by_kind(&child, "identifier") {
                        specifiers.push(Specifier::namespace(extract_text(&ident, source)));
                    }
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        if let Some(named) = self.aliased_specifier(&spec, source) {
                            specifiers.push(named);
                        }
                    }
                }
                _ => {}
            }
        }

        specifiers
    }

    fn process_export(&self, node: &TSNode, source: &[u8]) -> Option<ImportStatement> {
        let source_node = node.child_by_field_name("source")?;
        let literal = string_literal_value(&source_node, source)?;
        let line_number = node.start_position().row + 1;

        let mut specifiers = Vec::new();
        if let Some(clause) = find_child_by_kind(node, "export_clause") {
            let mut cursor = clause.walk();
            for spec in clause.named_children(&mut cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                if let Some(named) = self.aliased_specifier(&spec, source) {
                    specifiers.push(named);
                }
            }
        } else if let Some(namespace) = find_child_by_kind(node, "namespace_export") {
            if let Some(ident) = find_child_by_kind(&namespace, "identifier") {
                specifiers.push(Specifier::namespace(extract_text(&ident, source)));
            }
        }

        Some(
            ImportStatement::new(StatementKind::ReExport, literal, line_number)
                .with_specifiers(specifiers)
                .with_raw_text(first_line(extract_text(node, source))),
        )
    }

    fn process_call(&self, node: &TSNode, source: &[u8]) -> Option<ImportStatement> {
        let function = node.child_by_field_name("function")?;
        let kind = match function.kind() {
            "import" => StatementKind::DynamicImport,
            "identifier" if extract_text(&function, source) == "require" => StatementKind::Require,
            _ => return None,
        };

        let arguments = node.child_by_field_name("arguments")?;
        let first = arguments.named_child(0)?;
        let literal = string_literal_value(&first, source)?;

        let specifiers = if kind == StatementKind::Require {
            self.require_binding(node, source)
        } else {
            Vec::new()
        };

        Some(
            ImportStatement::new(kind, literal, node.start_position().row + 1)
                .with_specifiers(specifiers)
                .with_raw_text(first_line(extract_text(node, source))),
        )
    }

    /// `const x = require(..)` / `const { a, b: c } = require(..)`
    fn require_binding(&self, call: &TSNode, source: &[u8]) -> Vec<Specifier> {
        let Some(declarator) = call.parent() else {
            return Vec::new();
        };
        if declarator.kind() != "variable_declarator" {
            return Vec::new();
        }
        let Some(name) = declarator.child_by_field_name("name") else {
            return Vec::new();
        };

        match name.kind() {
            "identifier" => vec![Specifier::default_import(extract_text(&name, source))],
            "object_pattern" => {
                let mut specifiers = Vec::new();
                let mut cursor = name.walk();
                for property in name.named_children(&mut cursor) {
                    match property.kind() {
                        "shorthand_property_identifier_pattern" => {
                            let ident = extract_text(&property, source);
                            specifiers.push(Specifier::named(ident, ident));
                        }
                        "pair_pattern" => {
                            let key = property.child_by_field_name("key");
                            let value = property.child_by_field_name("value");
                            if let (Some(key), Some(value)) = (key, value) {
                                specifiers.push(Specifier::named(
                                    extract_text(&key, source),
                                    extract_text(&value, source),
                                ));
                            }
                        }
                        _ => {}
                    }
                }
                specifiers
            }
            _ => Vec::new(),
        }
    }

    fn aliased_specifier(&self, spec: &TSNode, source: &[u8]) -> Option<Specifier> {
        let name = spec.child_by_field_name("name")?;
        let imported = extract_text(&name, source);
        let local = spec
            .child_by_field_name("alias")
            .map(|alias| extract_text(&alias, source))
            .unwrap_or(imported);
        Some(Specifier::named(imported, local))
    }
}

impl StatementExtractor for TypeScriptExtractor {
    fn extract(&self, file_path: &Path, source: &str) -> Result<Vec<ImportStatement>> {
        let extension = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let grammar = Grammar::for_extension(&extension).ok_or_else(|| {
            anyhow::anyhow!("Unsupported extension for {}", file_path.display())
        })?;

        let mut parser = TreeSitterParser::new(grammar.language())?;
        let tree = parser.parse_source(source)?;
        let bytes = source.as_bytes();

        let mut statements = Vec::new();
        let mut cursor = tree.root_node().walk();
        visit_nodes(&mut cursor, |node| {
            let statement = match node.kind() {
                "import_statement" => self.process_import(&node, bytes),
                "export_statement" => self.process_export(&node, bytes),
                "call_expression" => self.process_call(&node, bytes),
                _ => None,
            };
            statements.extend(statement);
        });

        Ok(statements)
    }

    fn supports(&self, extension: &str) -> bool {
        Grammar::for_extension(&extension.to_ascii_lowercase()).is_some()
    }
}
