// Notebook document parsing
//
// Reads the nbformat JSON document into an ordered list of cells. Only
// structure is validated; cell contents are kept verbatim.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// nbformat major versions we understand
pub const SUPPORTED_NBFORMAT: [u32; 2] = [4, 5];

/// Kind of notebook cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// Executable code
    Code,
    /// Markdown or raw text
    Documentation,
}

/// One notebook cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Position in the notebook (0-based)
    pub index: usize,
    pub kind: CellKind,
    /// Raw source text
    pub source: String,
}

impl Cell {
    pub fn code(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            kind: CellKind::Code,
            source: source.into(),
        }
    }

    pub fn documentation(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            kind: CellKind::Documentation,
            source: source.into(),
        }
    }

    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }

    /// Whitespace-only source
    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }
}

/// Kernel information from notebook metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
}

/// Notebook-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    pub nbformat: u32,
    pub kernel: Option<KernelInfo>,
}

impl Default for NotebookMetadata {
    fn default() -> Self {
        Self {
            nbformat: 4,
            kernel: None,
        }
    }
}

/// A parsed notebook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    pub metadata: NotebookMetadata,
}

impl Notebook {
    /// Build a notebook from cells, renumbering them in order
    pub fn from_cells(cells: impl IntoIterator<Item = Cell>) -> Self {
        let cells = cells
            .into_iter()
            .enumerate()
            .map(|(index, cell)| Cell { index, ..cell })
            .collect();
        Self {
            cells,
            metadata: NotebookMetadata::default(),
        }
    }

    /// Build a notebook of code cells only
    pub fn from_code<S: AsRef<str>>(sources: &[S]) -> Self {
        Self::from_cells(
            sources
                .iter()
                .enumerate()
                .map(|(i, s)| Cell::code(i, s.as_ref())),
        )
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.is_code())
    }

    /// Code cells with non-blank source; the classifier's input
    pub fn classifiable_cells(&self) -> impl Iterator<Item = &Cell> {
        self.code_cells().filter(|c| !c.is_blank())
    }

    pub fn documentation_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| !c.is_code())
    }
}

#[derive(Deserialize)]
struct RawNotebook {
    cells: Option<Vec<RawCell>>,
    #[serde(default)]
    metadata: RawMetadata,
    nbformat: Option<u32>,
}

#[derive(Deserialize)]
struct RawCell {
    cell_type: Option<String>,
    source: Option<RawSource>,
}

/// nbformat allows the source as one string or a list of lines
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Text(String),
    Lines(Vec<String>),
}

#[derive(Deserialize, Default)]
struct RawMetadata {
    kernelspec: Option<RawKernelspec>,
    language_info: Option<RawLanguageInfo>,
}

#[derive(Deserialize)]
struct RawKernelspec {
    name: Option<String>,
    display_name: Option<String>,
    language: Option<String>,
}

#[derive(Deserialize)]
struct RawLanguageInfo {
    name: Option<String>,
    version: Option<String>,
}

impl RawMetadata {
    fn kernel(self) -> Option<KernelInfo> {
        if let Some(spec) = self.kernelspec {
            return Some(KernelInfo {
                name: spec.name.unwrap_or_else(|| "unknown".to_string()),
                display_name: spec.display_name,
                language: spec.language.or_else(|| Some("python".to_string())),
                version: self.language_info.and_then(|l| l.version),
            });
        }
        self.language_info.map(|info| KernelInfo {
            name: info.name.clone().unwrap_or_else(|| "python".to_string()),
            display_name: None,
            language: info.name,
            version: info.version,
        })
    }
}

/// Parser for nbformat notebook documents
#[derive(Debug, Default, Clone, Copy)]
pub struct NotebookParser;

impl NotebookParser {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse a notebook file
    pub fn parse_file(&self, path: &Path) -> Result<Notebook> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
        })?;
        self.parse(&bytes)
    }

    /// Parse raw notebook content
    pub fn parse(&self, content: &[u8]) -> Result<Notebook> {
        let raw: RawNotebook = serde_json::from_slice(content)
            .map_err(|e| Error::malformed(format!("not a notebook document: {}", e)))?;

        let nbformat = raw.nbformat.unwrap_or(4);
        if !SUPPORTED_NBFORMAT.contains(&nbformat) {
            return Err(Error::malformed(format!(
                "unsupported nbformat version {}",
                nbformat
            )));
        }

        let raw_cells = raw
            .cells
            .ok_or_else(|| Error::malformed("missing `cells`"))?;
        if raw_cells.is_empty() {
            return Err(Error::malformed("notebook has no cells"));
        }

        let cells = raw_cells
            .into_iter()
            .enumerate()
            .map(|(index, raw)| parse_cell(index, raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(Notebook {
            cells,
            metadata: NotebookMetadata {
                nbformat,
                kernel: raw.metadata.kernel(),
            },
        })
    }
}

fn parse_cell(index: usize, raw: RawCell) -> Result<Cell> {
    let cell_type = raw
        .cell_type
        .ok_or_else(|| Error::malformed(format!("cell {} has no `cell_type`", index)))?;
    let kind = match cell_type.as_str() {
        "code" => CellKind::Code,
        "markdown" | "raw" => CellKind::Documentation,
        other => {
            return Err(Error::malformed(format!(
                "cell {} has unknown cell_type `{}`",
                index, other
            )))
        }
    };

    let source = match raw.source {
        Some(RawSource::Text(text)) => text,
        Some(RawSource::Lines(lines)) => lines.concat(),
        None => {
            return Err(Error::malformed(format!(
                "cell {} has no `source`",
                index
            )))
        }
    };

    Ok(Cell {
        index,
        kind,
        source,
    })
}
