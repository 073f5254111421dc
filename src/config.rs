use crate::analysis::{Category, UnitName};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub conversion: ConversionConfig,
    pub output: OutputConfig,
    pub templates: TemplatesConfig,
    pub vcs: VcsConfig,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<String>,
}

/// Conversion settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub framework: Framework,
    /// Overrides of the default category routing
    pub routes: BTreeMap<Category, UnitName>,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub structure: Structure,
    pub force: bool,
    pub names: UnitFileNames,
}

/// Code files the converter writes next to the units
pub const RESERVED_FILE_NAMES: &[&str] = &["config.py"];

/// File name of each generated source unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitFileNames {
    pub main: String,
    pub functions: String,
    pub training: String,
}

/// Custom template settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub directory: Option<PathBuf>,
}

/// Version control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    pub git: bool,
    pub hooks: bool,
    pub dvc: bool,
    pub dvc_remote: Option<String>,
    pub ci: bool,
    /// Create develop, staging and experiment branches after the first commit
    pub branches: bool,
}

/// Target ML framework; selects configuration template variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Tensorflow,
    Pytorch,
    Sklearn,
    #[default]
    Generic,
}

/// Project layout written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Structure {
    /// Source files at the output root
    Flat,
    /// Standard ML layout with `src/`, `data/`, `models/`, ...
    #[default]
    Standard,
}

impl Framework {
    pub const ALL: [Framework; 4] = [
        Framework::Tensorflow,
        Framework::Pytorch,
        Framework::Sklearn,
        Framework::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Tensorflow => "tensorflow",
            Framework::Pytorch => "pytorch",
            Framework::Sklearn => "sklearn",
            Framework::Generic => "generic",
        }
    }

    /// Parse a framework name, case-insensitive
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.1.0".to_string(),
            description: None,
            author: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./converted_project"),
            structure: Structure::default(),
            force: false,
            names: UnitFileNames::default(),
        }
    }
}

impl Default for UnitFileNames {
    fn default() -> Self {
        Self {
            main: "main.py".to_string(),
            functions: "functions.py".to_string(),
            training: "training.py".to_string(),
        }
    }
}

impl UnitFileNames {
    /// File name for a unit
    pub fn get(&self, unit: UnitName) -> &str {
        match unit {
            UnitName::Main => &self.main,
            UnitName::Functions => &self.functions,
            UnitName::Training => &self.training,
        }
    }
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            git: false,
            hooks: true,
            dvc: false,
            dvc_remote: None,
            ci: false,
            branches: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file or return defaults
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(Error::Io(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Merge CLI arguments into config (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: CliOverrides) {
        if let Some(out) = cli.output {
            self.output.directory = out;
        }

        if let Some(framework) = cli.framework {
            self.conversion.framework = framework;
        }

        if cli.flat {
            self.output.structure = Structure::Flat;
        }

        if cli.force {
            self.output.force = true;
        }

        if let Some(dir) = cli.templates {
            self.templates.directory = Some(dir);
        }

        if let Some(name) = cli.name {
            self.project.name = name;
        }

        self.vcs.git |= cli.git;
        self.vcs.dvc |= cli.dvc;
        self.vcs.ci |= cli.ci;
        self.vcs.branches |= cli.branches;
        if cli.dvc_remote.is_some() {
            self.vcs.dvc_remote = cli.dvc_remote;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let names = &self.output.names;
        let mut seen = HashSet::new();
        for unit in UnitName::ALL {
            let file = names.get(unit);
            if file.trim().is_empty() {
                return Err(Error::config_validation(format!(
                    "file name for unit '{}' must not be empty",
                    unit
                )));
            }
            if !file.ends_with(".py") {
                return Err(Error::config_validation(format!(
                    "file name '{}' must end with .py",
                    file
                )));
            }
            // main.py star-imports the other units by module name
            if !is_module_file_name(file) {
                return Err(Error::config_validation(format!(
                    "file name '{}' is not an importable Python module name",
                    file
                )));
            }
            if RESERVED_FILE_NAMES.contains(&file) {
                return Err(Error::config_validation(format!(
                    "file name '{}' is reserved for a generated file",
                    file
                )));
            }
            if !seen.insert(file) {
                return Err(Error::config_validation(format!(
                    "file name '{}' is used by more than one unit",
                    file
                )));
            }
        }

        if self.vcs.branches && !self.vcs.git {
            return Err(Error::config_validation(
                "branches requires git to be enabled",
            ));
        }

        if self.vcs.dvc_remote.is_some() && !self.vcs.dvc {
            return Err(Error::config_validation(
                "dvc_remote requires dvc to be enabled",
            ));
        }

        Ok(())
    }
}

/// `name.py` where `name` is a plain Python identifier
fn is_module_file_name(file: &str) -> bool {
    let Some(stem) = file.strip_suffix(".py") else {
        return false;
    };
    let mut chars = stem.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output: Option<PathBuf>,
    pub framework: Option<Framework>,
    pub flat: bool,
    pub force: bool,
    pub templates: Option<PathBuf>,
    pub name: Option<String>,
    pub git: bool,
    pub dvc: bool,
    pub dvc_remote: Option<String>,
    pub ci: bool,
    pub branches: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.conversion.framework, Framework::Generic);
        assert_eq!(config.output.structure, Structure::Standard);
        assert_eq!(config.output.names.main, "main.py");
        assert!(config.vcs.hooks);
        assert!(!config.vcs.git);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[project]
name = "churn"
description = "Churn model"

[conversion]
framework = "pytorch"

[conversion.routes]
visualization = "functions"

[output]
structure = "flat"

[output.names]
training = "train.py"

[vcs]
git = true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.project.name, "churn");
        assert_eq!(config.conversion.framework, Framework::Pytorch);
        assert_eq!(
            config.conversion.routes.get(&Category::Visualization),
            Some(&UnitName::Functions)
        );
        assert_eq!(config.output.structure, Structure::Flat);
        assert_eq!(config.output.names.training, "train.py");
        assert_eq!(config.output.names.main, "main.py");
        assert!(config.vcs.git);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/nbforge.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/nbforge.toml"));
        assert_eq!(config.output.names, UnitFileNames::default());
    }

    #[test]
    fn test_unknown_framework_rejected() {
        let result: std::result::Result<ConversionConfig, _> =
            toml::from_str(r#"framework = "caffe""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_non_python_name() {
        let mut config = Config::default();
        config.output.names.functions = "functions.txt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_names() {
        let mut config = Config::default();
        config.output.names.training = "main.py".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_name() {
        let mut config = Config::default();
        config.output.names.main = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_generated_file_name() {
        let mut config = Config::default();
        config.output.names.main = "config.py".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(ref m) if m.contains("reserved")));
    }

    #[test]
    fn test_validation_rejects_non_module_names() {
        for name in ["sub/main.py", "my-file.py", "1st.py", ".py", "a b.py"] {
            let mut config = Config::default();
            config.output.names.functions = name.to_string();
            assert!(config.validate().is_err(), "{} accepted", name);
        }

        let mut config = Config::default();
        config.output.names.functions = "_helpers2.py".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_remote_without_dvc() {
        let mut config = Config::default();
        config.vcs.dvc_remote = Some("s3://bucket/data".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_branches_without_git() {
        let mut config = Config::default();
        config.vcs.branches = true;
        assert!(config.validate().is_err());
        config.vcs.git = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_cli() {
        let mut config = Config::default();
        config.merge_cli(CliOverrides {
            output: Some(PathBuf::from("/tmp/out")),
            framework: Some(Framework::Sklearn),
            flat: true,
            dvc: true,
            dvc_remote: Some("/tmp/remote".to_string()),
            ..Default::default()
        });
        assert_eq!(config.output.directory, PathBuf::from("/tmp/out"));
        assert_eq!(config.conversion.framework, Framework::Sklearn);
        assert_eq!(config.output.structure, Structure::Flat);
        assert!(config.vcs.dvc);
        assert_eq!(config.vcs.dvc_remote.as_deref(), Some("/tmp/remote"));
    }

    #[test]
    fn test_merge_cli_keeps_file_values() {
        let mut config = Config::default();
        config.vcs.git = true;
        config.conversion.framework = Framework::Tensorflow;
        config.merge_cli(CliOverrides::default());
        assert!(config.vcs.git);
        assert_eq!(config.conversion.framework, Framework::Tensorflow);
    }

    #[test]
    fn test_framework_parse() {
        assert_eq!(Framework::parse("PyTorch"), Some(Framework::Pytorch));
        assert_eq!(Framework::parse("generic"), Some(Framework::Generic));
        assert_eq!(Framework::parse("caffe"), None);
    }
}
