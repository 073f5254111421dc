// Template registries backed by Tera
//
// A template may declare the context keys it cannot render without in a
// leading comment:
//
//     {#- requires: project, unit -#}
//
// Declared keys are checked before rendering so a missing key is reported
// by name instead of as a generic render failure.

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tera::{Context, Tera, Value};
use walkdir::WalkDir;

/// Built-in templates: (name, source)
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("main.py", include_str!("../../templates/main.py.tera")),
    ("functions.py", include_str!("../../templates/functions.py.tera")),
    ("training.py", include_str!("../../templates/training.py.tera")),
    ("config.py", include_str!("../../templates/config.py.tera")),
    ("requirements.txt", include_str!("../../templates/requirements.txt.tera")),
    ("project_config.yaml", include_str!("../../templates/project_config.yaml.tera")),
    ("environment.yaml", include_str!("../../templates/environment.yaml.tera")),
    (
        "training_config.tensorflow.yaml",
        include_str!("../../templates/training_config.tensorflow.yaml.tera"),
    ),
    (
        "training_config.pytorch.yaml",
        include_str!("../../templates/training_config.pytorch.yaml.tera"),
    ),
    (
        "training_config.sklearn.yaml",
        include_str!("../../templates/training_config.sklearn.yaml.tera"),
    ),
    (
        "training_config.generic.yaml",
        include_str!("../../templates/training_config.generic.yaml.tera"),
    ),
    ("data_config.yaml", include_str!("../../templates/data_config.yaml.tera")),
    ("gitignore", include_str!("../../templates/gitignore.tera")),
    ("README.md", include_str!("../../templates/README.md.tera")),
    ("ci_workflow.yml", include_str!("../../templates/ci_workflow.yml.tera")),
    ("pre-commit", include_str!("../../templates/pre-commit.tera")),
    ("post-commit", include_str!("../../templates/post-commit.tera")),
];

/// Extension of template files in a custom template directory
pub const TEMPLATE_EXTENSION: &str = "tera";

/// Lookup and registration of named templates
pub trait TemplateRegistry {
    /// Find a template by name
    fn resolve(&self, name: &str) -> Result<Template<'_>>;

    /// Add a template, replacing any existing one with the same name
    fn register(&mut self, name: &str, content: &str) -> Result<()>;

    /// All resolvable template names, sorted
    fn names(&self) -> Vec<String>;
}

/// A resolved template, ready to render
#[derive(Debug, Clone)]
pub struct Template<'a> {
    name: &'a str,
    engine: &'a Tera,
    required: &'a [String],
}

impl<'a> Template<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    /// Context keys declared by the template
    pub fn required_keys(&self) -> &[String] {
        self.required
    }

    /// Render with the given context
    pub fn render(&self, context: &Context) -> Result<String> {
        if let Some(key) = self.required.iter().find(|k| !context.contains_key(k)) {
            return Err(Error::missing_key(self.name, key.as_str()));
        }
        self.engine
            .render(self.name, context)
            .map_err(|e| render_error(self.name, e))
    }
}

/// Compiled templates plus their declared keys
struct TemplateSet {
    tera: Tera,
    required: HashMap<String, Vec<String>>,
}

impl TemplateSet {
    fn new() -> Self {
        let mut tera = Tera::default();
        register_filters(&mut tera);
        Self {
            tera,
            required: HashMap::new(),
        }
    }

    /// An empty set whose engine already knows the templates of `base`
    fn extending(base: &TemplateSet) -> Self {
        Self {
            tera: base.tera.clone(),
            required: HashMap::new(),
        }
    }

    fn add(&mut self, name: &str, content: &str) -> Result<()> {
        self.tera.add_raw_template(name, content)?;
        self.required
            .insert(name.to_string(), required_keys(content));
        Ok(())
    }

    fn get(&self, name: &str) -> Option<Template<'_>> {
        self.required
            .get_key_value(name)
            .map(|(name, required)| Template {
                name,
                engine: &self.tera,
                required,
            })
    }

    fn names(&self) -> impl Iterator<Item = &String> {
        self.required.keys()
    }
}

/// The templates shipped with nbforge; read-only
pub struct BuiltinTemplates {
    set: TemplateSet,
}

impl BuiltinTemplates {
    pub fn new() -> Result<Self> {
        let mut set = TemplateSet::new();
        for (name, content) in BUILTIN_TEMPLATES {
            set.add(name, content)?;
        }
        Ok(Self { set })
    }
}

impl TemplateRegistry for BuiltinTemplates {
    fn resolve(&self, name: &str) -> Result<Template<'_>> {
        self.set
            .get(name)
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    fn register(&mut self, name: &str, _content: &str) -> Result<()> {
        Err(Error::other(format!(
            "cannot register '{}': built-in templates are read-only",
            name
        )))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.set.names().cloned().collect();
        names.sort();
        names
    }
}

/// Caller-registered templates layered over the built-ins
///
/// A custom template with a built-in's name shadows it. Custom templates
/// compile against a copy of the built-in engine, so they can `include`
/// or `extends` any built-in template.
pub struct CustomTemplates {
    base: BuiltinTemplates,
    custom: TemplateSet,
}

impl CustomTemplates {
    pub fn new(base: BuiltinTemplates) -> Self {
        let custom = TemplateSet::extending(&base.set);
        Self { base, custom }
    }

    /// Register every `*.tera` file under a directory
    ///
    /// The template name is the path relative to the directory without the
    /// `.tera` extension, so `main.py.tera` overrides `main.py`.
    pub fn from_dir(base: BuiltinTemplates, dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::PathNotFound(dir.to_path_buf()));
        }

        let mut registry = Self::new(base);
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION)
            {
                continue;
            }
            let name = template_name(dir, path);
            let content = std::fs::read_to_string(path)?;
            registry.register(&name, &content)?;
            tracing::debug!(template = %name, "registered custom template");
        }
        Ok(registry)
    }

    /// Names registered by the caller, sorted
    pub fn custom_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.custom.names().cloned().collect();
        names.sort();
        names
    }
}

impl TemplateRegistry for CustomTemplates {
    fn resolve(&self, name: &str) -> Result<Template<'_>> {
        match self.custom.get(name) {
            Some(template) => Ok(template),
            None => self.base.resolve(name),
        }
    }

    fn register(&mut self, name: &str, content: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::other("template name must not be empty"));
        }
        self.custom.add(name, content)
    }

    fn names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .base
            .names()
            .into_iter()
            .chain(self.custom.names().cloned())
            .collect();
        names.into_iter().collect()
    }
}

/// Template name for a file inside a template directory
fn template_name(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path).with_extension("");
    relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse a leading `{#- requires: a, b -#}` declaration
pub fn required_keys(content: &str) -> Vec<String> {
    let first = content.trim_start().lines().next().unwrap_or("");
    let Some(start) = first.find("requires:") else {
        return Vec::new();
    };
    if !first.starts_with("{#") {
        return Vec::new();
    }
    let rest = &first[start + "requires:".len()..];
    let end = rest.find("#}").unwrap_or(rest.len());
    rest[..end]
        .trim_end_matches('-')
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Map a Tera render failure to our error type
///
/// Tera reports an undefined variable deep in its error chain; surface it
/// as a missing key so it names what the caller forgot.
fn render_error(template: &str, error: tera::Error) -> Error {
    let mut messages = vec![error.to_string()];
    let mut source = std::error::Error::source(&error);
    while let Some(inner) = source {
        messages.push(inner.to_string());
        source = inner.source();
    }

    for message in &messages {
        if let Some(key) = undefined_variable(message) {
            return Error::missing_key(template, key);
        }
    }

    Error::TemplateRender {
        template: template.to_string(),
        message: messages.join(": "),
    }
}

fn undefined_variable(message: &str) -> Option<String> {
    let start = message.find("Variable `")? + "Variable `".len();
    let rest = &message[start..];
    if !rest.contains("not found in context") {
        return None;
    }
    let end = rest.find('`')?;
    let path = &rest[..end];
    Some(path.split('.').next().unwrap_or(path).to_string())
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("indent_code", indent_code);
    tera.register_filter("py_identifier", py_identifier_filter);
    tera.register_filter("pluralize", pluralize);
}

/// Indent every non-blank line
fn indent_code(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().unwrap_or("");
    let width = args.get("width").and_then(|v| v.as_u64()).unwrap_or(4) as usize;
    let pad = " ".repeat(width);

    let indented = s
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Value::String(indented))
}

fn py_identifier_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().unwrap_or("");
    Ok(Value::String(py_identifier(s)))
}

/// Convert text to a valid Python identifier
pub fn py_identifier(s: &str) -> String {
    let ident = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    match ident.chars().next() {
        None => "project".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{}", ident),
        Some(_) => ident,
    }
}

/// Pluralize a word based on count
fn pluralize(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let count = value.as_u64().unwrap_or(0);
    let singular = args
        .get("singular")
        .and_then(|v| v.as_str())
        .unwrap_or("item");
    let default_plural = format!("{}s", singular);
    let plural = args
        .get("plural")
        .and_then(|v| v.as_str())
        .unwrap_or(&default_plural);

    if count == 1 {
        Ok(Value::String(format!("{} {}", count, singular)))
    } else {
        Ok(Value::String(format!("{} {}", count, plural)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_compile() {
        let registry = BuiltinTemplates::new().unwrap();
        assert_eq!(registry.names().len(), BUILTIN_TEMPLATES.len());
        assert!(registry.resolve("main.py").is_ok());
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = BuiltinTemplates::new().unwrap();
        let err = registry.resolve("nope.py").unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(ref n) if n == "nope.py"));
    }

    #[test]
    fn test_builtins_are_read_only() {
        let mut registry = BuiltinTemplates::new().unwrap();
        assert!(registry.register("x", "y").is_err());
    }

    #[test]
    fn test_builtin_main_declares_keys() {
        let registry = BuiltinTemplates::new().unwrap();
        let main = registry.resolve("main.py").unwrap();
        assert!(main.required_keys().contains(&"project".to_string()));
        assert!(main.required_keys().contains(&"unit".to_string()));
    }

    #[test]
    fn test_custom_register_and_render() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry
            .register("hello.txt", "{#- requires: who -#}\nhello {{ who }}")
            .unwrap();

        let mut context = Context::new();
        context.insert("who", "world");
        let out = registry.resolve("hello.txt").unwrap().render(&context).unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[test]
    fn test_custom_shadows_builtin() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry.register("gitignore", "*.custom\n").unwrap();
        let out = registry
            .resolve("gitignore")
            .unwrap()
            .render(&Context::new())
            .unwrap();
        assert_eq!(out.trim(), "*.custom");
        assert_eq!(registry.names().len(), BUILTIN_TEMPLATES.len());
    }

    #[test]
    fn test_custom_falls_back_to_builtin() {
        let registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        assert!(registry.resolve("README.md").is_ok());
        assert!(registry.custom_names().is_empty());
    }

    #[test]
    fn test_custom_can_include_builtin() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry
            .register("gitignore.extra", "{% include \"gitignore\" %}\n*.extra\n")
            .unwrap();
        let out = registry
            .resolve("gitignore.extra")
            .unwrap()
            .render(&Context::new())
            .unwrap();
        assert!(out.contains("data/raw/"));
        assert!(out.trim_end().ends_with("*.extra"));
        assert_eq!(registry.custom_names(), vec!["gitignore.extra".to_string()]);
    }

    #[test]
    fn test_builtin_unaffected_by_shadowing() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry.register("gitignore", "*.custom\n").unwrap();
        let builtin = registry
            .base
            .resolve("gitignore")
            .unwrap()
            .render(&Context::new())
            .unwrap();
        assert!(builtin.contains("data/raw/"));
    }

    #[test]
    fn test_register_invalid_template() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        let err = registry.register("bad", "{% for x in %}").unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn test_missing_declared_key() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry
            .register("greet", "{#- requires: who, greeting -#}\n{{ greeting }} {{ who }}")
            .unwrap();
        let mut context = Context::new();
        context.insert("who", "x");
        let err = registry.resolve("greet").unwrap().render(&context).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingContextKey { ref template, ref key } if template == "greet" && key == "greeting"
        ));
    }

    #[test]
    fn test_undeclared_missing_key_is_named() {
        let mut registry = CustomTemplates::new(BuiltinTemplates::new().unwrap());
        registry.register("loose", "value: {{ settings.depth }}").unwrap();
        let err = registry
            .resolve("loose")
            .unwrap()
            .render(&Context::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingContextKey { ref key, .. } if key == "settings"));
    }

    #[test]
    fn test_from_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("extra")).unwrap();
        fs::write(dir.path().join("main.py.tera"), "# custom main\n").unwrap();
        fs::write(dir.path().join("extra/notes.md.tera"), "notes\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "not a template").unwrap();

        let registry = CustomTemplates::from_dir(BuiltinTemplates::new().unwrap(), dir.path()).unwrap();
        assert_eq!(
            registry.custom_names(),
            vec!["extra/notes.md".to_string(), "main.py".to_string()]
        );
        let out = registry.resolve("main.py").unwrap().render(&Context::new()).unwrap();
        assert_eq!(out.trim(), "# custom main");
    }

    #[test]
    fn test_from_missing_dir() {
        let result = CustomTemplates::from_dir(
            BuiltinTemplates::new().unwrap(),
            Path::new("/nonexistent/templates"),
        );
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_required_keys_parsing() {
        assert_eq!(
            required_keys("{#- requires: project, unit -#}\nbody"),
            vec!["project".to_string(), "unit".to_string()]
        );
        assert_eq!(required_keys("{# requires: a #}"), vec!["a".to_string()]);
        assert!(required_keys("no declaration").is_empty());
        assert!(required_keys("x = 1  # requires: nothing").is_empty());
    }

    #[test]
    fn test_undefined_variable_parsing() {
        assert_eq!(
            undefined_variable("Variable `project.name` not found in context while rendering 'x'"),
            Some("project".to_string())
        );
        assert_eq!(undefined_variable("Failed to render 'x'"), None);
    }

    #[test]
    fn test_indent_code() {
        let value = Value::String("a = 1\n\nif a:\n    b()".to_string());
        let mut args = HashMap::new();
        args.insert("width".to_string(), Value::Number(4.into()));
        let result = indent_code(&value, &args).unwrap();
        assert_eq!(result.as_str().unwrap(), "    a = 1\n\n    if a:\n        b()");
    }

    #[test]
    fn test_py_identifier() {
        assert_eq!(py_identifier("Churn Model v2"), "churn_model_v2");
        assert_eq!(py_identifier("2024-sales"), "_2024_sales");
        assert_eq!(py_identifier("---"), "project");
    }

    #[test]
    fn test_pluralize() {
        let mut args = HashMap::new();
        args.insert("singular".to_string(), Value::String("cell".to_string()));
        let one = pluralize(&Value::Number(1.into()), &args).unwrap();
        let many = pluralize(&Value::Number(3.into()), &args).unwrap();
        assert_eq!(one.as_str().unwrap(), "1 cell");
        assert_eq!(many.as_str().unwrap(), "3 cells");
    }
}
