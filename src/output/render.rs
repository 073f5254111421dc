// Template rendering of logical units and configuration artifacts
//
// Views are plain serializable structs; the renderer builds a Tera context
// from them and resolves the template through a registry, so built-in and
// custom templates go through the same path.

use crate::analysis::{Category, DependencyReport, LogicalUnit, UnitName};
use crate::config::{Framework, Structure};
use crate::error::Result;
use crate::output::templates::{py_identifier, TemplateRegistry};
use serde::Serialize;
use tera::Context;

/// Python version used when the kernel does not report one
pub const DEFAULT_PYTHON_VERSION: &str = "3.10";

/// Packages installed through conda rather than pip in `environment.yaml`
const CONDA_PACKAGES: &[&str] = &["tensorflow", "pytorch", "torch", "cudatoolkit"];

/// Project metadata shared by every template
#[derive(Debug, Clone, Serialize)]
pub struct ProjectMeta {
    pub name: String,
    /// Python-safe form of the name
    pub module: String,
    pub version: String,
    pub description: String,
    pub author: String,
    /// Source notebook file name
    pub notebook: String,
    pub framework: Framework,
    pub structure: Structure,
    pub python_version: String,
    /// Directory holding the generated code, relative to the project root
    pub source_dir: String,
    /// Path of the training unit, relative to the project root
    pub training_path: String,
}

impl ProjectMeta {
    pub fn new(name: &str, notebook: &str, framework: Framework, structure: Structure) -> Self {
        let source_dir = match structure {
            Structure::Standard => "src",
            Structure::Flat => ".",
        };
        Self {
            name: name.to_string(),
            module: py_identifier(name),
            version: "0.1.0".to_string(),
            description: String::new(),
            author: String::new(),
            notebook: notebook.to_string(),
            framework,
            structure,
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            source_dir: source_dir.to_string(),
            training_path: code_path(structure, "training.py"),
        }
    }
}

/// Path of a code file for a project layout
pub fn code_path(structure: Structure, file_name: &str) -> String {
    match structure {
        Structure::Standard => format!("src/{}", file_name),
        Structure::Flat => file_name.to_string(),
    }
}

/// A classified cell as seen by templates
#[derive(Debug, Clone, Serialize)]
pub struct CellView {
    pub index: usize,
    pub category: Category,
    pub category_title: String,
    /// Cell source with notebook magics commented out
    pub source: String,
}

/// A logical unit as seen by templates
#[derive(Debug, Clone, Serialize)]
pub struct UnitView {
    pub name: UnitName,
    pub file_name: String,
    /// Importable module name
    pub module: String,
    /// Path relative to the project root
    pub path: String,
    pub cells: Vec<CellView>,
    /// Import cells, placed at module level
    pub imports: Vec<CellView>,
    /// Every other cell
    pub body: Vec<CellView>,
}

impl UnitView {
    pub fn new(unit: &LogicalUnit, file_name: &str, structure: Structure) -> Self {
        let cells: Vec<CellView> = unit
            .cells
            .iter()
            .map(|c| CellView {
                index: c.cell.index,
                category: c.category,
                category_title: c.category.title(),
                source: comment_magics(&c.cell.source),
            })
            .collect();
        let (imports, body) = cells
            .iter()
            .cloned()
            .partition(|c| c.category == Category::Imports);

        Self {
            name: unit.name,
            file_name: file_name.to_string(),
            module: file_name.trim_end_matches(".py").to_string(),
            path: code_path(structure, file_name),
            cells,
            imports,
            body,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Built-in template name for this unit
    pub fn template_name(&self) -> String {
        format!("{}.py", self.name)
    }
}

/// Turn notebook magic and shell lines into comments
pub fn comment_magics(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('%') || trimmed.starts_with('!') {
                let indent = &line[..line.len() - trimmed.len()];
                format!("{}# {}", indent, trimmed)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders named templates with typed contexts
pub struct TemplateRenderer<R: TemplateRegistry> {
    registry: R,
}

impl<R: TemplateRegistry> TemplateRenderer<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Render any template with a prepared context
    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        self.registry.resolve(name)?.render(context)
    }

    fn project_context(project: &ProjectMeta) -> Context {
        let mut context = Context::new();
        context.insert("project", project);
        context
    }

    /// Render one logical unit; `siblings` are the other non-empty units
    pub fn render_unit(
        &self,
        project: &ProjectMeta,
        unit: &UnitView,
        siblings: &[UnitView],
    ) -> Result<String> {
        let mut context = Self::project_context(project);
        context.insert("unit", unit);
        context.insert("siblings", siblings);
        self.render(&unit.template_name(), &context)
    }

    /// Render a template that only needs project metadata
    pub fn render_project(&self, name: &str, project: &ProjectMeta) -> Result<String> {
        self.render(name, &Self::project_context(project))
    }

    /// Framework-specific training configuration
    pub fn render_training_config(&self, project: &ProjectMeta) -> Result<String> {
        let name = format!("training_config.{}.yaml", project.framework);
        self.render_project(&name, project)
    }

    pub fn render_requirements(
        &self,
        project: &ProjectMeta,
        report: &DependencyReport,
    ) -> Result<String> {
        let (requirements, unresolved) = report.requirements();
        let mut context = Self::project_context(project);
        context.insert("requirements", &requirements);
        context.insert("unresolved", &unresolved);
        self.render("requirements.txt", &context)
    }

    pub fn render_project_config(
        &self,
        project: &ProjectMeta,
        report: &DependencyReport,
    ) -> Result<String> {
        let mut context = Self::project_context(project);
        context.insert("dependencies", &report.by_category());
        self.render("project_config.yaml", &context)
    }

    pub fn render_environment(
        &self,
        project: &ProjectMeta,
        report: &DependencyReport,
    ) -> Result<String> {
        let (requirements, _) = report.requirements();
        let (conda, pip): (Vec<String>, Vec<String>) = requirements
            .into_iter()
            .partition(|name| CONDA_PACKAGES.contains(&name.as_str()));

        let mut context = Self::project_context(project);
        context.insert("conda", &conda);
        context.insert("pip", &pip);
        self.render("environment.yaml", &context)
    }

    pub fn render_readme(
        &self,
        project: &ProjectMeta,
        units: &[UnitView],
        documentation: &[String],
        report: &DependencyReport,
    ) -> Result<String> {
        let mut context = Self::project_context(project);
        context.insert("units", units);
        context.insert("documentation", documentation);
        context.insert("dependencies", &report.by_category());
        self.render("README.md", &context)
    }
}
