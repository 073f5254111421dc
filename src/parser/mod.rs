// Notebook and cell-source parsing

pub mod ast;
mod notebook;
mod python;

pub use ast::*;
pub use notebook::{
    Cell, CellKind, KernelInfo, Notebook, NotebookMetadata, NotebookParser, SUPPORTED_NBFORMAT,
};
pub use python::{blank_magics, PythonScanner};
