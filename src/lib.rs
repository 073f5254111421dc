//! nbforge - Convert Jupyter notebooks into structured ML projects
//!
//! A notebook is parsed into cells, each code cell is classified, the
//! classified cells are grouped into source units and everything is
//! rendered through Tera templates. Imports are collected into a
//! categorized dependency report used for the configuration files.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod parser;
pub mod scaffold;
pub mod vcs;

// Re-export main types
pub use analysis::{
    Category, Classifier, DependencyAnalyzer, DependencyReport, FileAggregator, LogicalUnit,
    UnitName,
};
pub use config::Config;
pub use convert::{Conversion, Converter, RenderedFile};
pub use error::{Error, Result};
pub use output::{BuiltinTemplates, CustomTemplates, TemplateRegistry, TemplateRenderer};
pub use parser::{Cell, CellKind, Notebook, NotebookParser};
