// Python cell scanner using tree-sitter

use crate::error::{Error, Result};
use crate::parser::ast::*;
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

/// Scanner that outlines the Python source of a notebook cell
pub struct PythonScanner {
    parser: Parser,
}

impl PythonScanner {
    /// Create a new Python scanner
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::language();
        parser
            .set_language(&language)
            .map_err(|e| Error::other(format!("Failed to set Python language: {}", e)))?;
        Ok(Self { parser })
    }

    /// Outline a cell's source
    pub fn scan(&mut self, source: &str) -> Result<SourceOutline> {
        let cleaned = blank_magics(source);
        let tree = self
            .parser
            .parse(&cleaned, None)
            .ok_or_else(|| Error::other("tree-sitter failed to parse cell source"))?;

        let root = tree.root_node();
        let bytes = cleaned.as_bytes();
        let mut outline = SourceOutline::default();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "comment" => continue,
                "import_statement" | "import_from_statement" | "future_import_statement" => {
                    outline.import_statements += 1;
                }
                "function_definition" | "class_definition" | "decorated_definition" => {
                    outline.definitions += 1;
                }
                _ => {}
            }
            outline.statements += 1;
        }

        let mut rows = RowSets::default();
        let mut imports = Vec::new();
        collect_imports(&root, bytes, &mut imports, &mut rows);
        outline.imports = imports
            .into_iter()
            .filter(|import| !rows.errored.contains(&(import.line - 1)))
            .collect();

        for (row, line) in cleaned.lines().enumerate() {
            let trimmed = line.trim();
            let parsed = rows.covered.contains(&row) && !rows.errored.contains(&row);
            if looks_like_import(trimmed) && !parsed && !rows.shielded.contains(&row) {
                outline.malformed_imports.push(MalformedImport {
                    line: row + 1,
                    text: trimmed.to_string(),
                });
            }
        }

        Ok(outline)
    }
}

/// Rows spanned by well-formed imports, strings/comments and parse errors
#[derive(Default)]
struct RowSets {
    covered: HashSet<usize>,
    shielded: HashSet<usize>,
    errored: HashSet<usize>,
}

/// Replace IPython magics and shell escapes with blank lines
///
/// Line numbers are preserved so diagnostics still point at the cell.
pub fn blank_magics(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('%') || trimmed.starts_with('!') {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn looks_like_import(line: &str) -> bool {
    matches!(line.split_whitespace().next(), Some("import") | Some("from"))
}

fn mark_rows(node: &Node, rows: &mut HashSet<usize>) {
    rows.extend(node.start_position().row..=node.end_position().row);
}

/// Walk the tree collecting imports at any depth
fn collect_imports(node: &Node, source: &[u8], imports: &mut Vec<Import>, rows: &mut RowSets) {
    if node.is_error() || node.is_missing() {
        mark_rows(node, &mut rows.errored);
    }

    match node.kind() {
        "import_statement" | "import_from_statement" | "future_import_statement" => {
            if node.has_error() {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_imports(&child, source, imports, rows);
                }
                return;
            }
            let parsed = match node.kind() {
                "import_statement" => parse_import(node, source),
                "import_from_statement" => parse_import_from(node, source).into_iter().collect(),
                _ => vec![Import::from_import("__future__", node.start_position().row + 1)],
            };
            if !parsed.is_empty() {
                mark_rows(node, &mut rows.covered);
                imports.extend(parsed);
            }
        }
        "string" | "comment" => mark_rows(node, &mut rows.shielded),
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_imports(&child, source, imports, rows);
            }
        }
    }
}

/// Parse an import statement: `import x`, `import x as y`, `import x, y`
fn parse_import(node: &Node, source: &[u8]) -> Vec<Import> {
    let line = node.start_position().row + 1;
    let mut imports = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let name_node = match child.kind() {
            "dotted_name" => Some(child),
            "aliased_import" => child.child_by_field_name("name"),
            _ => None,
        };
        if let Some(text) = name_node.and_then(|n| n.utf8_text(source).ok()) {
            imports.push(Import::simple(text, line));
        }
    }

    imports
}

/// Parse an import-from statement: `from x import y`
fn parse_import_from(node: &Node, source: &[u8]) -> Option<Import> {
    let line = node.start_position().row + 1;
    let module_node = node.child_by_field_name("module_name")?;

    if module_node.kind() == "relative_import" {
        let mut level = 0;
        let mut module = String::new();
        let mut cursor = module_node.walk();
        for inner in module_node.children(&mut cursor) {
            match inner.kind() {
                "import_prefix" => {
                    level = inner.utf8_text(source).ok()?.chars().filter(|c| *c == '.').count();
                }
                "dotted_name" => {
                    module = inner.utf8_text(source).ok()?.to_string();
                }
                _ => {}
            }
        }
        return Some(Import::relative(&module, level, line));
    }

    let module = module_node.utf8_text(source).ok()?;
    Some(Import::from_import(module, line))
}
