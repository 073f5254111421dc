// Project layout writer
//
// Writes a finished conversion to disk. The target is checked before any
// file is created, and only complete conversions reach this module.

use crate::config::{OutputConfig, Structure};
use crate::convert::{Conversion, RenderedFile, CI_WORKFLOW_PATH};
use crate::error::{Error, Result};
use crate::vcs::{Git, GitStatus};
use std::fs;
use std::path::{Path, PathBuf};

/// Directories of the standard ML project layout
pub const STANDARD_DIRS: &[&str] = &[
    "data/raw",
    "data/processed",
    "data/external",
    "models/trained",
    "models/pretrained",
    "notebooks",
    "tests",
    "docs",
    "reports/figures",
    "config",
    "src",
];

/// Writes rendered projects to a directory
#[derive(Debug, Clone)]
pub struct ProjectWriter {
    root: PathBuf,
    structure: Structure,
    force: bool,
}

impl ProjectWriter {
    pub fn new(root: impl Into<PathBuf>, structure: Structure, force: bool) -> Self {
        Self {
            root: root.into(),
            structure,
            force,
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(&output.directory, output.structure, output.force)
    }

    /// Same settings, different target directory
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fail if the target exists and is not empty, unless forced
    pub fn check_target(&self) -> Result<()> {
        if self.force || !self.root.exists() {
            return Ok(());
        }
        if !self.root.is_dir() {
            return Err(Error::OutputExists(self.root.clone()));
        }
        if fs::read_dir(&self.root)?.next().is_some() {
            return Err(Error::OutputExists(self.root.clone()));
        }
        Ok(())
    }

    /// Create the layout and write every file of a conversion
    pub fn write(&self, conversion: &Conversion) -> Result<WriteReport> {
        self.check_target()?;
        let mut report = WriteReport::default();

        fs::create_dir_all(&self.root)?;
        if self.structure == Structure::Standard {
            for dir in STANDARD_DIRS {
                let path = self.root.join(dir);
                if !path.exists() {
                    fs::create_dir_all(&path)?;
                    report.directories_created += 1;
                }
            }
        }

        self.write_files(&conversion.files, &mut report)?;

        // Keep otherwise empty layout directories under version control
        if self.structure == Structure::Standard {
            for dir in STANDARD_DIRS {
                let path = self.root.join(dir);
                if fs::read_dir(&path)?.next().is_none() {
                    fs::write(path.join(".gitkeep"), "")?;
                }
            }
        }

        tracing::info!(
            root = %self.root.display(),
            files = report.files.len(),
            "project written"
        );
        Ok(report)
    }

    /// Write files into an existing project, replacing files at the same paths
    pub fn update(&self, files: &[RenderedFile]) -> Result<WriteReport> {
        if !self.root.is_dir() {
            return Err(Error::PathNotFound(self.root.clone()));
        }
        let mut report = WriteReport::default();
        self.write_files(files, &mut report)?;
        tracing::info!(
            root = %self.root.display(),
            files = report.files.len(),
            "project updated"
        );
        Ok(report)
    }

    fn write_files(&self, files: &[RenderedFile], report: &mut WriteReport) -> Result<()> {
        for file in files {
            let path = self.root.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &file.content)?;
            report.files.push(file.path.clone());
        }
        Ok(())
    }
}

/// What a write created
#[derive(Debug, Default)]
pub struct WriteReport {
    pub directories_created: usize,
    /// Written files, relative to the project root
    pub files: Vec<PathBuf>,
}

impl WriteReport {
    pub fn summary(&self) -> String {
        format!(
            "Wrote {} files, created {} directories",
            self.files.len(),
            self.directories_created
        )
    }
}

/// Layout of a project on disk: standard when it has a `src/` directory
pub fn detect_structure(root: &Path) -> Structure {
    if root.join("src").is_dir() {
        Structure::Standard
    } else {
        Structure::Flat
    }
}

/// Snapshot of a generated project on disk
#[derive(Debug)]
pub struct ProjectStatus {
    pub root: PathBuf,
    pub structure: Structure,
    /// Python files in the source directory, sorted
    pub code_files: Vec<String>,
    /// Files under `config/`, sorted
    pub config_files: Vec<String>,
    /// Non-comment lines of `requirements.txt`
    pub requirements: Option<usize>,
    pub ci: bool,
    pub dvc: bool,
    pub git: Option<GitStatus>,
}

impl ProjectStatus {
    /// Inspect a project directory
    pub fn inspect(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::PathNotFound(root.to_path_buf()));
        }

        let structure = detect_structure(root);
        let source_dir = match structure {
            Structure::Standard => root.join("src"),
            Structure::Flat => root.to_path_buf(),
        };

        let requirements = match fs::read_to_string(root.join("requirements.txt")) {
            Ok(text) => Some(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .count(),
            ),
            Err(_) => None,
        };

        let git = match Git::open(root) {
            Some(git) => match git.status() {
                Ok(status) => Some(status),
                Err(e) => {
                    tracing::warn!("cannot read git status: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            root: root.to_path_buf(),
            structure,
            code_files: list_files(&source_dir, Some("py"))?,
            config_files: list_files(&root.join("config"), None)?,
            requirements,
            ci: root.join(CI_WORKFLOW_PATH).is_file(),
            dvc: root.join(".dvc").is_dir(),
            git,
        })
    }
}

/// File names directly inside a directory, optionally filtered by extension
fn list_files(dir: &Path, extension: Option<&str>) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if extension.is_some() && path.extension().and_then(|e| e.to_str()) != extension {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
