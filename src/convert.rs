// Notebook to project conversion pipeline
//
// parse -> classify -> aggregate -> render, with dependency analysis run
// over the same parsed notebook. Conversion produces file contents only;
// nothing touches the filesystem until the caller hands the result to a
// writer.

use crate::analysis::{
    ClassifiedCell, Classifier, DependencyAnalysis, DependencyAnalyzer, DependencyEntry,
    DependencyReport, DependencyWarning, FileAggregator, LogicalUnit, UnitMapping, UnitName,
};
use crate::config::{Config, Structure};
use crate::error::{Error, Result, Step};
use crate::output::{code_path, ProjectMeta, TemplateRegistry, TemplateRenderer, UnitView};
use crate::parser::{Notebook, NotebookParser};
use crate::scaffold::detect_structure;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Workflow file written when CI is enabled
pub const CI_WORKFLOW_PATH: &str = ".github/workflows/ml-pipeline.yml";

/// Git hooks rendered for installation after `git init`
pub const HOOKS: &[&str] = &["pre-commit", "post-commit"];

/// Saved dependency report, relative to the project root
pub const DEPENDENCY_FILE: &str = "dependencies.json";

/// A generated file with its path relative to the project root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
}

impl RenderedFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Result of converting one notebook
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub notebook: PathBuf,
    pub project: ProjectMeta,
    /// Cells in the source notebook, blank ones included
    pub cell_count: usize,
    pub classified: Vec<ClassifiedCell>,
    pub units: Vec<LogicalUnit>,
    pub report: DependencyReport,
    pub warnings: Vec<DependencyWarning>,
    /// Project files, code units first
    pub files: Vec<RenderedFile>,
    /// Git hook scripts, keyed by hook name
    pub hooks: Vec<RenderedFile>,
}

impl Conversion {
    pub fn file(&self, path: impl AsRef<Path>) -> Option<&RenderedFile> {
        let path = path.as_ref();
        self.files.iter().find(|f| f.path == path)
    }

    pub fn unit(&self, name: UnitName) -> Option<&LogicalUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn summary(&self) -> String {
        let units = self
            .units
            .iter()
            .map(|u| format!("{} {}", u.name, u.cells.len()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} cells ({} classified: {}), {} dependencies, {} warnings",
            self.cell_count,
            self.classified.len(),
            units,
            self.report.len(),
            self.warnings.len()
        )
    }
}

/// Serialized form of `dependencies.json`
///
/// Written with every project and read back to regenerate its
/// configuration files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyFile {
    pub notebook: String,
    pub packages: Vec<DependencyEntry>,
    pub by_category: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<DependencyWarning>,
}

impl DependencyFile {
    pub fn new(notebook: &str, report: &DependencyReport, warnings: &[DependencyWarning]) -> Self {
        Self {
            notebook: notebook.to_string(),
            packages: report.entries().cloned().collect(),
            by_category: report
                .by_category()
                .into_iter()
                .map(|(category, names)| (category.to_string(), names))
                .collect(),
            warnings: warnings.to_vec(),
        }
    }

    /// Read `dependencies.json` from a project root, if there is one
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join(DEPENDENCY_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Rebuild the dependency report from the saved entries
    pub fn report(&self) -> DependencyReport {
        DependencyReport::from_entries(self.packages.iter().cloned())
    }
}

/// Converts notebooks into rendered project files
pub struct Converter<R: TemplateRegistry> {
    config: Config,
    aggregator: FileAggregator,
    renderer: TemplateRenderer<R>,
}

impl<R: TemplateRegistry> Converter<R> {
    pub fn new(config: Config, registry: R) -> Self {
        let aggregator = FileAggregator::new(UnitMapping::with_overrides(&config.conversion.routes));
        Self {
            config,
            aggregator,
            renderer: TemplateRenderer::new(registry),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn renderer(&self) -> &TemplateRenderer<R> {
        &self.renderer
    }

    /// Read and convert a notebook file
    pub fn convert_file(&self, path: &Path) -> Result<Conversion> {
        let content = std::fs::read(path).map_err(|e| Error::from(e).during(path, Step::Read))?;
        self.convert(path, &content)
    }

    /// Convert raw notebook content; `notebook` names it in errors and output
    pub fn convert(&self, notebook: &Path, content: &[u8]) -> Result<Conversion> {
        let parsed = NotebookParser::new()
            .parse(content)
            .map_err(|e| e.during(notebook, Step::Parse))?;
        let mut conversion = self.convert_notebook(notebook, &parsed)?;

        // Keep the source notebook alongside the generated code
        if self.config.output.structure == Structure::Standard {
            if let Some(file_name) = notebook.file_name() {
                conversion.files.push(RenderedFile::new(
                    Path::new("notebooks").join(file_name),
                    String::from_utf8_lossy(content),
                ));
            }
        }

        Ok(conversion)
    }

    /// Convert an already parsed notebook
    pub fn convert_notebook(&self, notebook: &Path, parsed: &Notebook) -> Result<Conversion> {
        let mut classifier = Classifier::new().map_err(|e| e.during(notebook, Step::Parse))?;
        let mut analyzer = DependencyAnalyzer::new().map_err(|e| e.during(notebook, Step::Parse))?;

        let classified = classifier.classify_notebook(parsed);
        let DependencyAnalysis { report, warnings } = analyzer.analyze(parsed);
        let units = self.aggregator.aggregate(&classified);
        let project = self.project_meta(notebook, parsed);

        let files = self
            .render_files(&project, &units, parsed, &report, &warnings)
            .map_err(|e| e.during(notebook, Step::Render))?;
        let hooks = self
            .render_hooks(&project)
            .map_err(|e| e.during(notebook, Step::Render))?;

        tracing::debug!(
            notebook = %notebook.display(),
            files = files.len(),
            "conversion rendered"
        );

        Ok(Conversion {
            notebook: notebook.to_path_buf(),
            project,
            cell_count: parsed.len(),
            classified,
            units,
            report,
            warnings,
            files,
            hooks,
        })
    }

    /// Render an empty project: every unit as a placeholder
    pub fn scaffold(&self) -> Result<Conversion> {
        let name = if self.config.project.name.trim().is_empty() {
            "project".to_string()
        } else {
            self.config.project.name.clone()
        };
        let notebook = PathBuf::from(format!("{}.ipynb", crate::output::py_identifier(&name)));
        self.convert_notebook(&notebook, &Notebook::from_cells(Vec::new()))
    }

    /// Metadata and saved dependency report of a project already on disk
    ///
    /// The layout is detected from the directory; the name falls back to
    /// the directory name when the config has none.
    pub fn load_project(&self, root: &Path) -> Result<(ProjectMeta, DependencyReport)> {
        if !root.is_dir() {
            return Err(Error::PathNotFound(root.to_path_buf()));
        }
        let saved = DependencyFile::load(root)?;
        if saved.is_none() {
            tracing::debug!(root = %root.display(), "no {} found", DEPENDENCY_FILE);
        }

        let dir_name = std::fs::canonicalize(root)
            .ok()
            .and_then(|p| p.file_name().and_then(|s| s.to_str()).map(str::to_string))
            .unwrap_or_else(|| "project".to_string());
        let notebook = saved.as_ref().map(|s| s.notebook.as_str()).unwrap_or_default();
        let project = self.meta(&dir_name, notebook, detect_structure(root));
        let report = saved.map(|s| s.report()).unwrap_or_default();
        Ok((project, report))
    }

    fn project_meta(&self, notebook: &Path, parsed: &Notebook) -> ProjectMeta {
        let stem = notebook
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("project");
        let notebook_name = notebook
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let mut meta = self.meta(stem, notebook_name, self.config.output.structure);
        if let Some(version) = parsed
            .metadata
            .kernel
            .as_ref()
            .and_then(|k| k.version.as_deref())
            .and_then(python_minor_version)
        {
            meta.python_version = version;
        }
        meta
    }

    fn meta(&self, fallback_name: &str, notebook_name: &str, structure: Structure) -> ProjectMeta {
        let cfg = &self.config.project;
        let name = if cfg.name.trim().is_empty() {
            fallback_name
        } else {
            cfg.name.as_str()
        };
        let mut meta = ProjectMeta::new(name, notebook_name, self.config.conversion.framework, structure);
        meta.version = cfg.version.clone();
        meta.description = cfg.description.clone().unwrap_or_default();
        meta.author = cfg.author.clone().unwrap_or_default();
        meta.training_path = code_path(structure, &self.config.output.names.training);
        meta
    }

    fn render_files(
        &self,
        project: &ProjectMeta,
        units: &[LogicalUnit],
        parsed: &Notebook,
        report: &DependencyReport,
        warnings: &[DependencyWarning],
    ) -> Result<Vec<RenderedFile>> {
        let structure = self.config.output.structure;
        let names = &self.config.output.names;
        let views: Vec<UnitView> = units
            .iter()
            .map(|u| UnitView::new(u, names.get(u.name), structure))
            .collect();

        let mut files = Vec::new();
        for view in &views {
            let siblings: Vec<UnitView> = if view.name == UnitName::Main {
                views
                    .iter()
                    .filter(|v| v.name != UnitName::Main && !v.is_empty())
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            let content = self.renderer.render_unit(project, view, &siblings)?;
            files.push(RenderedFile::new(&view.path, content));
        }

        let r = &self.renderer;
        files.push(RenderedFile::new(
            code_path(structure, "config.py"),
            r.render_project("config.py", project)?,
        ));
        files.push(RenderedFile::new(
            "requirements.txt",
            r.render_requirements(project, report)?,
        ));
        files.extend(self.render_config_files(project, report)?);
        files.push(RenderedFile::new(".gitignore", r.render_project("gitignore", project)?));

        let documentation: Vec<String> = parsed
            .documentation_cells()
            .filter(|c| !c.is_blank())
            .map(|c| c.source.clone())
            .collect();
        files.push(RenderedFile::new(
            "README.md",
            r.render_readme(project, &views, &documentation, report)?,
        ));

        if self.config.vcs.ci {
            files.push(self.render_ci(project)?);
        }

        let dependency_file = DependencyFile::new(&project.notebook, report, warnings);
        files.push(RenderedFile::new(
            DEPENDENCY_FILE,
            serde_json::to_string_pretty(&dependency_file)?,
        ));

        // A later file at the same path would overwrite an earlier one on disk
        let mut paths = HashSet::new();
        if let Some(file) = files.iter().find(|f| !paths.insert(&f.path)) {
            return Err(Error::config_validation(format!(
                "more than one generated file would be written to '{}'",
                file.path.display()
            )));
        }

        Ok(files)
    }

    /// The `config/` YAML files
    pub fn render_config_files(
        &self,
        project: &ProjectMeta,
        report: &DependencyReport,
    ) -> Result<Vec<RenderedFile>> {
        let r = &self.renderer;
        Ok(vec![
            RenderedFile::new(
                "config/project_config.yaml",
                r.render_project_config(project, report)?,
            ),
            RenderedFile::new(
                "config/environment.yaml",
                r.render_environment(project, report)?,
            ),
            RenderedFile::new(
                "config/training_config.yaml",
                r.render_training_config(project)?,
            ),
            RenderedFile::new(
                "config/data_config.yaml",
                r.render_project("data_config.yaml", project)?,
            ),
        ])
    }

    /// GitHub Actions workflow
    pub fn render_ci(&self, project: &ProjectMeta) -> Result<RenderedFile> {
        let content = self.renderer.render_project("ci_workflow.yml", project)?;
        Ok(RenderedFile::new(CI_WORKFLOW_PATH, content))
    }

    /// Hook scripts, empty unless git and hooks are both enabled
    pub fn render_hooks(&self, project: &ProjectMeta) -> Result<Vec<RenderedFile>> {
        let vcs = &self.config.vcs;
        if !(vcs.git && vcs.hooks) {
            return Ok(Vec::new());
        }
        HOOKS
            .iter()
            .map(|hook| {
                self.renderer
                    .render_project(hook, project)
                    .map(|content| RenderedFile::new(*hook, content))
            })
            .collect()
    }
}

/// `3.11.4` -> `3.11`
fn python_minor_version(version: &str) -> Option<String> {
    let mut parts = version.trim().split('.');
    let major = parts.next().filter(|p| p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty())?;
    let minor = parts.next().filter(|p| p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty())?;
    Some(format!("{}.{}", major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Category, DependencyCategory};
    use crate::config::Framework;
    use crate::output::{BuiltinTemplates, CustomTemplates};

    const SCENARIO: &str = r#"{
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {"language_info": {"name": "python", "version": "3.11.4"}},
        "cells": [
            {"cell_type": "code", "source": "import numpy as np", "metadata": {}, "outputs": []},
            {"cell_type": "code", "source": ["def f(x): ", "return x*2"], "metadata": {}, "outputs": []},
            {"cell_type": "code", "source": "model.fit(X,y)", "metadata": {}, "outputs": []},
            {"cell_type": "code", "source": "plt.plot(x,y)", "metadata": {}, "outputs": []}
        ]
    }"#;

    fn converter(config: Config) -> Converter<BuiltinTemplates> {
        Converter::new(config, BuiltinTemplates::new().unwrap())
    }

    fn convert(config: Config, content: &str) -> Result<Conversion> {
        converter(config).convert(Path::new("scenario.ipynb"), content.as_bytes())
    }

    #[test]
    fn test_scenario_pipeline() {
        let conversion = convert(Config::default(), SCENARIO).unwrap();

        let categories: Vec<_> = conversion.classified.iter().map(|c| c.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Imports,
                Category::FunctionDefinitions,
                Category::ModelTraining,
                Category::Visualization,
            ]
        );
        assert_eq!(conversion.unit(UnitName::Main).unwrap().indices(), vec![0, 3]);
        assert_eq!(conversion.unit(UnitName::Functions).unwrap().indices(), vec![1]);
        assert_eq!(conversion.unit(UnitName::Training).unwrap().indices(), vec![2]);
        assert_eq!(conversion.report.len(), 1);
        assert_eq!(
            conversion.report.category_of("numpy"),
            Some(DependencyCategory::DataScience)
        );
    }

    #[test]
    fn test_standard_layout_paths() {
        let conversion = convert(Config::default(), SCENARIO).unwrap();
        for path in [
            "src/main.py",
            "src/functions.py",
            "src/training.py",
            "src/config.py",
            "requirements.txt",
            "config/project_config.yaml",
            "config/environment.yaml",
            "config/training_config.yaml",
            "config/data_config.yaml",
            ".gitignore",
            "README.md",
            "dependencies.json",
            "notebooks/scenario.ipynb",
        ] {
            assert!(conversion.file(path).is_some(), "missing {}", path);
        }
        assert!(conversion.file(CI_WORKFLOW_PATH).is_none());
        assert!(conversion.hooks.is_empty());
    }

    #[test]
    fn test_flat_layout_and_custom_names() {
        let mut config = Config::default();
        config.output.structure = Structure::Flat;
        config.output.names.functions = "utils.py".to_string();
        let conversion = convert(config, SCENARIO).unwrap();

        assert!(conversion.file("main.py").is_some());
        assert!(conversion.file("utils.py").is_some());
        assert!(conversion.file("notebooks/scenario.ipynb").is_none());
        let main = &conversion.file("main.py").unwrap().content;
        assert!(main.contains("from utils import *"));
        assert!(main.contains("from training import *"));
    }

    #[test]
    fn test_project_name_defaults_to_notebook_stem() {
        let conversion = convert(Config::default(), SCENARIO).unwrap();
        assert_eq!(conversion.project.name, "scenario");
        assert_eq!(conversion.project.python_version, "3.11");
        assert!(conversion.file("README.md").unwrap().content.starts_with("# scenario"));
    }

    #[test]
    fn test_dependencies_json() {
        let conversion = convert(Config::default(), SCENARIO).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&conversion.file("dependencies.json").unwrap().content).unwrap();
        assert_eq!(json["packages"][0]["package_name"], "numpy");
        assert_eq!(json["packages"][0]["category"], "data-science");
        assert_eq!(json["by_category"]["data-science"][0], "numpy");
        assert!(json["warnings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_unit_named_like_generated_file_is_rejected() {
        let mut config = Config::default();
        config.output.names.main = "config.py".to_string();
        let err = convert(config, SCENARIO).unwrap_err();
        match err {
            Error::Conversion { step, source, .. } => {
                assert_eq!(step, Step::Render);
                assert!(matches!(*source, Error::ConfigValidation(ref m) if m.contains("src/config.py")));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_project_reads_saved_dependencies() {
        let dir = tempfile::TempDir::new().unwrap();
        let conversion = convert(Config::default(), SCENARIO).unwrap();
        let saved = conversion.file(DEPENDENCY_FILE).unwrap();
        std::fs::write(dir.path().join(DEPENDENCY_FILE), &saved.content).unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let mut config = Config::default();
        config.conversion.framework = Framework::Sklearn;
        let converter = converter(config);
        let (project, report) = converter.load_project(dir.path()).unwrap();
        assert_eq!(project.notebook, "scenario.ipynb");
        assert_eq!(project.structure, Structure::Standard);
        assert_eq!(report, conversion.report);

        let files = converter.render_config_files(&project, &report).unwrap();
        assert_eq!(files.len(), 4);
        let training = files
            .iter()
            .find(|f| f.path == Path::new("config/training_config.yaml"))
            .unwrap();
        assert!(training.content.contains("cv_folds"));
        let project_config = files
            .iter()
            .find(|f| f.path == Path::new("config/project_config.yaml"))
            .unwrap();
        assert!(project_config.content.contains("numpy"));
    }

    #[test]
    fn test_load_project_without_saved_dependencies() {
        let dir = tempfile::TempDir::new().unwrap();
        let project_root = dir.path().join("forecast");
        std::fs::create_dir(&project_root).unwrap();

        let (project, report) = converter(Config::default()).load_project(&project_root).unwrap();
        assert_eq!(project.name, "forecast");
        assert_eq!(project.structure, Structure::Flat);
        assert!(report.is_empty());
    }

    #[test]
    fn test_load_project_missing_dir() {
        let result = converter(Config::default()).load_project(Path::new("/nonexistent/project"));
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_framework_selects_training_config() {
        let mut config = Config::default();
        config.conversion.framework = Framework::Tensorflow;
        let conversion = convert(config, SCENARIO).unwrap();
        let training = &conversion.file("config/training_config.yaml").unwrap().content;
        assert!(training.contains("early_stopping_patience"));
    }

    #[test]
    fn test_ci_and_hooks() {
        let mut config = Config::default();
        config.vcs.ci = true;
        config.vcs.git = true;
        let conversion = convert(config, SCENARIO).unwrap();
        assert!(conversion.file(CI_WORKFLOW_PATH).is_some());
        let hooks: Vec<_> = conversion.hooks.iter().map(|h| h.path.clone()).collect();
        assert_eq!(hooks, vec![PathBuf::from("pre-commit"), PathBuf::from("post-commit")]);
    }

    #[test]
    fn test_malformed_notebook_names_step() {
        let err = convert(Config::default(), "{\"nbformat\": 4}").unwrap_err();
        match err {
            Error::Conversion { notebook, step, source } => {
                assert_eq!(notebook, PathBuf::from("scenario.ipynb"));
                assert_eq!(step, Step::Parse);
                assert!(matches!(*source, Error::MalformedNotebook { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = converter(Config::default())
            .convert_file(Path::new("/nonexistent/nb.ipynb"))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { step: Step::Read, .. }));
    }

    #[test]
    fn test_broken_template_aborts_conversion() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry
            .register("functions.py", "{#- requires: helpers -#}\n{{ helpers }}")
            .unwrap();
        let err = Converter::new(Config::default(), registry)
            .convert(Path::new("scenario.ipynb"), SCENARIO.as_bytes())
            .unwrap_err();
        match err {
            Error::Conversion { step, source, .. } => {
                assert_eq!(step, Step::Render);
                assert!(matches!(*source, Error::MissingContextKey { ref key, .. } if key == "helpers"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_scaffold_renders_empty_units() {
        let mut config = Config::default();
        config.project.name = "Demand Forecast".to_string();
        let conversion = converter(config).scaffold().unwrap();
        assert!(conversion.units.iter().all(|u| u.is_empty()));
        assert_eq!(conversion.notebook, PathBuf::from("demand_forecast.ipynb"));
        assert!(conversion.file("src/main.py").unwrap().content.contains("def main():"));
    }

    #[test]
    fn test_python_minor_version() {
        assert_eq!(python_minor_version("3.11.4"), Some("3.11".to_string()));
        assert_eq!(python_minor_version("3.9"), Some("3.9".to_string()));
        assert_eq!(python_minor_version("python3"), None);
    }

    #[test]
    fn test_summary() {
        let conversion = convert(Config::default(), SCENARIO).unwrap();
        let summary = conversion.summary();
        assert!(summary.contains("4 cells"));
        assert!(summary.contains("main 2"));
        assert!(summary.contains("1 dependencies"));
    }
}
