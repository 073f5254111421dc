use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// nbforge error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Malformed notebook: {reason}")]
    MalformedNotebook { reason: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template '{template}' is missing required context key '{key}'")]
    MissingContextKey { template: String, key: String },

    #[error("Failed to render template '{template}': {message}")]
    TemplateRender { template: String, message: String },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Output directory is not empty: {0} (use --force to overwrite)")]
    OutputExists(PathBuf),

    #[error("Conversion of {notebook} failed during {step}: {source}")]
    Conversion {
        notebook: PathBuf,
        step: Step,
        #[source]
        source: Box<Error>,
    },

    #[error("`{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for nbforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline step a conversion failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Read,
    Parse,
    Render,
    Write,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Read => "read",
            Step::Parse => "parse",
            Step::Render => "render",
            Step::Write => "write",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a config validation error
    pub fn config_validation(msg: impl Into<String>) -> Self {
        Error::ConfigValidation(msg.into())
    }

    /// Create a malformed notebook error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedNotebook {
            reason: reason.into(),
        }
    }

    /// Create a missing context key error
    pub fn missing_key(template: impl Into<String>, key: impl Into<String>) -> Self {
        Error::MissingContextKey {
            template: template.into(),
            key: key.into(),
        }
    }

    /// Create an external command error
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Command {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Attach the notebook and pipeline step to an error
    pub fn during(self, notebook: impl Into<PathBuf>, step: Step) -> Self {
        Error::Conversion {
            notebook: notebook.into(),
            step,
            source: Box::new(self),
        }
    }
}
