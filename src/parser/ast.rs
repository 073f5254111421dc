// Outline types for scanned cell source
//
// A cell is not a module: it is a fragment of one. The outline keeps only
// what classification and dependency analysis look at.

use serde::{Deserialize, Serialize};

/// Structural summary of one cell's Python source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceOutline {
    /// Top-level statements, comments excluded
    pub statements: usize,
    /// Top-level `import` / `from ... import` statements
    pub import_statements: usize,
    /// Top-level function and class definitions (decorated included)
    pub definitions: usize,
    /// Every well-formed import in the cell, nested ones included
    pub imports: Vec<Import>,
    /// Import-looking lines that did not parse
    pub malformed_imports: Vec<MalformedImport>,
}

impl SourceOutline {
    /// Top-level statements that are not imports
    pub fn non_import_statements(&self) -> usize {
        self.statements.saturating_sub(self.import_statements)
    }

    /// Check if the cell has no statements at all
    pub fn is_empty(&self) -> bool {
        self.statements == 0
    }
}

/// An import statement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Import {
    /// The module being imported, dotted
    pub module: String,
    /// Import kind
    pub kind: ImportKind,
    /// Line number within the cell (1-based)
    pub line: usize,
}

impl Import {
    /// Create a simple `import x` style import
    pub fn simple(module: &str, line: usize) -> Self {
        Self {
            module: module.to_string(),
            kind: ImportKind::Direct,
            line,
        }
    }

    /// Create a `from x import y` style import
    pub fn from_import(module: &str, line: usize) -> Self {
        Self {
            module: module.to_string(),
            kind: ImportKind::From,
            line,
        }
    }

    /// Create a relative import
    pub fn relative(module: &str, level: usize, line: usize) -> Self {
        Self {
            module: module.to_string(),
            kind: ImportKind::Relative { level },
            line,
        }
    }

    /// First component of the dotted module path
    pub fn top_level(&self) -> &str {
        self.module.split('.').next().unwrap_or(&self.module)
    }
}

/// Kind of import statement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ImportKind {
    /// `import x` or `import x as y`
    Direct,
    /// `from x import y`
    From,
    /// `from . import y` or `from ..x import y`
    Relative { level: usize },
}

impl ImportKind {
    pub fn is_relative(&self) -> bool {
        matches!(self, ImportKind::Relative { .. })
    }
}

/// An import line the scanner could not make sense of
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MalformedImport {
    /// Line number within the cell (1-based)
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}
