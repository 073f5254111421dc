// Dependency analysis for notebook imports
//
// Collects every distinct top-level package imported anywhere in the
// notebook and resolves it to a category through static lookup tables.
// Relative imports are local code and never reported.

use crate::error::Result;
use crate::parser::{Notebook, PythonScanner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of an imported package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyCategory {
    /// Python standard library
    Core,
    DataScience,
    MlFramework,
    Visualization,
    Unknown,
}

impl DependencyCategory {
    pub const ALL: [DependencyCategory; 5] = [
        DependencyCategory::Core,
        DependencyCategory::DataScience,
        DependencyCategory::MlFramework,
        DependencyCategory::Visualization,
        DependencyCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyCategory::Core => "core",
            DependencyCategory::DataScience => "data-science",
            DependencyCategory::MlFramework => "ml-framework",
            DependencyCategory::Visualization => "visualization",
            DependencyCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DependencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Python standard library modules (top-level only)
const STDLIB: &[&str] = &[
    "__future__", "_thread", "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64",
    "bdb", "binascii", "bisect", "builtins", "bz2", "calendar", "cmath", "cmd", "code", "codecs",
    "collections", "colorsys", "concurrent", "configparser", "contextlib", "contextvars", "copy",
    "copyreg", "cprofile", "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal",
    "difflib", "dis", "doctest", "email", "encodings", "enum", "errno", "faulthandler", "fcntl",
    "filecmp", "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt",
    "getpass", "gettext", "glob", "graphlib", "gzip", "hashlib", "heapq", "hmac", "html", "http",
    "imaplib", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword",
    "linecache", "locale", "logging", "lzma", "mailbox", "marshal", "math", "mimetypes", "mmap",
    "multiprocessing", "netrc", "numbers", "operator", "optparse", "os", "pathlib", "pdb",
    "pickle", "pickletools", "pkgutil", "platform", "plistlib", "poplib", "posixpath", "pprint",
    "profile", "pstats", "pty", "pwd", "py_compile", "pydoc", "queue", "quopri", "random", "re",
    "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched", "secrets", "select",
    "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtplib", "socket",
    "socketserver", "sqlite3", "ssl", "stat", "statistics", "string", "stringprep", "struct",
    "subprocess", "symtable", "sys", "sysconfig", "syslog", "tabnanny", "tarfile", "tempfile",
    "termios", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle", "types", "typing",
    "unicodedata", "unittest", "urllib", "uuid", "venv", "warnings", "wave", "weakref",
    "webbrowser", "wsgiref", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib",
    "zoneinfo",
];

const DATA_SCIENCE: &[&str] = &[
    "numpy", "pandas", "scipy", "statsmodels", "polars", "pyarrow", "dask", "sympy", "numba",
    "xarray", "h5py", "tables", "openpyxl",
];

const ML_FRAMEWORKS: &[&str] = &[
    "sklearn", "tensorflow", "keras", "torch", "torchvision", "torchaudio", "xgboost",
    "lightgbm", "catboost", "jax", "flax", "transformers", "datasets", "mxnet", "onnx",
    "onnxruntime", "optuna", "mlflow", "pytorch_lightning", "lightning", "imblearn",
];

const VISUALIZATION: &[&str] = &[
    "matplotlib", "seaborn", "plotly", "bokeh", "altair", "graphviz", "pydot", "wordcloud",
    "folium", "holoviews", "yellowbrick",
];

/// Import names whose pip distribution name differs
const DISTRIBUTIONS: &[(&str, &str)] = &[
    ("sklearn", "scikit-learn"),
    ("cv2", "opencv-python"),
    ("PIL", "pillow"),
    ("yaml", "pyyaml"),
    ("bs4", "beautifulsoup4"),
    ("imblearn", "imbalanced-learn"),
    ("skimage", "scikit-image"),
    ("dotenv", "python-dotenv"),
    ("pytorch_lightning", "pytorch-lightning"),
];

/// Normalized lookup key for a package name
///
/// Import spellings that differ only in case or `-`/`_` are variants of
/// the same package.
pub fn normalize_package(name: &str) -> String {
    name.trim().to_lowercase().replace('-', "_")
}

/// Resolve a top-level package name to its category
pub fn categorize_package(name: &str) -> DependencyCategory {
    let key = normalize_package(name);
    let tables = [
        (STDLIB, DependencyCategory::Core),
        (DATA_SCIENCE, DependencyCategory::DataScience),
        (ML_FRAMEWORKS, DependencyCategory::MlFramework),
        (VISUALIZATION, DependencyCategory::Visualization),
    ];
    tables
        .iter()
        .find(|(names, _)| names.contains(&key.as_str()))
        .map(|(_, category)| *category)
        .unwrap_or(DependencyCategory::Unknown)
}

/// pip distribution name for an import name
pub fn distribution_name(import_name: &str) -> String {
    DISTRIBUTIONS
        .iter()
        .find(|(import, _)| import.eq_ignore_ascii_case(import_name))
        .map(|(_, dist)| dist.to_string())
        .unwrap_or_else(|| import_name.to_string())
}

/// One package in the dependency report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// Spelling of the last import that referenced the package
    pub package_name: String,
    pub category: DependencyCategory,
    /// Notebook indices of the cells importing it
    pub cells: Vec<usize>,
}

/// An import line that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyWarning {
    /// Notebook index of the cell
    pub cell: usize,
    /// Line within the cell (1-based)
    pub line: usize,
    pub text: String,
}

impl fmt::Display for DependencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cell {}, line {}: skipped unparseable import `{}`",
            self.cell, self.line, self.text
        )
    }
}

/// Distinct packages keyed by normalized name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub packages: BTreeMap<String, DependencyEntry>,
}

impl DependencyReport {
    /// Record one import of a package
    ///
    /// Re-imports under a variant spelling keep one entry; the last-seen
    /// spelling becomes the entry's `package_name`.
    pub fn record(&mut self, package_name: &str, cell: usize) {
        let category = categorize_package(package_name);
        let entry = self
            .packages
            .entry(normalize_package(package_name))
            .or_insert_with(|| DependencyEntry {
                package_name: package_name.to_string(),
                category,
                cells: Vec::new(),
            });
        entry.package_name = package_name.to_string();
        entry.category = category;
        if !entry.cells.contains(&cell) {
            entry.cells.push(cell);
        }
    }

    /// Rebuild a report from saved entries; later duplicates win
    pub fn from_entries(entries: impl IntoIterator<Item = DependencyEntry>) -> Self {
        let packages = entries
            .into_iter()
            .map(|entry| (normalize_package(&entry.package_name), entry))
            .collect();
        Self { packages }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, package_name: &str) -> Option<&DependencyEntry> {
        self.packages.get(&normalize_package(package_name))
    }

    pub fn category_of(&self, package_name: &str) -> Option<DependencyCategory> {
        self.get(package_name).map(|e| e.category)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.packages.values()
    }

    /// Package names in one category, sorted
    pub fn names_in(&self, category: DependencyCategory) -> Vec<String> {
        self.entries()
            .filter(|e| e.category == category)
            .map(|e| e.package_name.clone())
            .collect()
    }

    /// Packages grouped by category label; every category is present
    pub fn by_category(&self) -> BTreeMap<&'static str, Vec<String>> {
        DependencyCategory::ALL
            .iter()
            .map(|c| (c.as_str(), self.names_in(*c)))
            .collect()
    }

    /// pip requirement names for third-party packages
    ///
    /// Standard-library modules are left out; unknown packages are
    /// returned separately because they may be local modules.
    pub fn requirements(&self) -> (Vec<String>, Vec<String>) {
        let mut known = Vec::new();
        let mut unresolved = Vec::new();
        for entry in self.entries() {
            match entry.category {
                DependencyCategory::Core => {}
                DependencyCategory::Unknown => unresolved.push(distribution_name(&entry.package_name)),
                _ => known.push(distribution_name(&entry.package_name)),
            }
        }
        known.sort();
        known.dedup();
        unresolved.sort();
        unresolved.dedup();
        (known, unresolved)
    }
}

/// Dependency report plus the warnings collected while building it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub report: DependencyReport,
    pub warnings: Vec<DependencyWarning>,
}

/// Extracts package dependencies from notebook code cells
pub struct DependencyAnalyzer {
    scanner: PythonScanner,
}

impl DependencyAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            scanner: PythonScanner::new()?,
        })
    }

    /// Analyze every code cell of a notebook
    pub fn analyze(&mut self, notebook: &Notebook) -> DependencyAnalysis {
        let mut analysis = DependencyAnalysis::default();

        for cell in notebook.classifiable_cells() {
            let outline = match self.scanner.scan(&cell.source) {
                Ok(outline) => outline,
                Err(e) => {
                    tracing::warn!(cell = cell.index, "skipping dependency scan: {}", e);
                    continue;
                }
            };

            for import in outline.imports.iter().filter(|i| !i.kind.is_relative()) {
                let package = import.top_level();
                if !package.is_empty() {
                    analysis.report.record(package, cell.index);
                }
            }

            for malformed in outline.malformed_imports {
                let warning = DependencyWarning {
                    cell: cell.index,
                    line: malformed.line,
                    text: malformed.text,
                };
                tracing::warn!("{}", warning);
                analysis.warnings.push(warning);
            }
        }

        analysis
    }
}
