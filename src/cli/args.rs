//! CLI argument parsing

use crate::config::{CliOverrides, Framework};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Convert Jupyter notebooks into structured ML projects
#[derive(Parser, Debug)]
#[command(name = "nbforge")]
#[command(about = "Convert Jupyter notebooks into structured ML projects")]
#[command(version)]
pub struct Args {
    /// Increase log verbosity
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ./nbforge.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Default log filter for the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                _ => "debug",
            }
        }
    }
}

/// Options shared by commands that generate a project
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct ProjectOptions {
    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Target framework (tensorflow, pytorch, sklearn, generic)
    #[arg(long, value_parser = parse_framework)]
    pub framework: Option<Framework>,

    /// Write code files to the output root instead of src/
    #[arg(long)]
    pub flat: bool,

    /// Write into a non-empty output directory
    #[arg(long)]
    pub force: bool,

    /// Directory of custom *.tera templates
    #[arg(long)]
    pub templates: Option<PathBuf>,

    /// Initialise a git repository with hooks
    #[arg(long)]
    pub git: bool,

    /// Initialise DVC
    #[arg(long)]
    pub dvc: bool,

    /// Default DVC remote URL
    #[arg(long, requires = "dvc")]
    pub dvc_remote: Option<String>,

    /// Emit a GitHub Actions workflow
    #[arg(long)]
    pub ci: bool,
}

impl ProjectOptions {
    pub fn overrides(self, name: Option<String>) -> CliOverrides {
        CliOverrides {
            output: self.output,
            framework: self.framework,
            flat: self.flat,
            force: self.force,
            templates: self.templates,
            name,
            git: self.git,
            dvc: self.dvc,
            dvc_remote: self.dvc_remote,
            ci: self.ci,
            branches: false,
        }
    }
}

fn parse_framework(s: &str) -> Result<Framework, String> {
    Framework::parse(s).ok_or_else(|| {
        let known: Vec<_> = Framework::ALL.iter().map(|f| f.as_str()).collect();
        format!("unknown framework '{}' (expected one of: {})", s, known.join(", "))
    })
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert one or more notebooks into projects
    Convert {
        /// Notebook files (.ipynb)
        #[arg(required = true)]
        notebooks: Vec<PathBuf>,

        /// Project name (default: notebook file name)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        options: ProjectOptions,
    },

    /// Create an empty project scaffold
    Init {
        /// Project name
        name: String,

        #[command(flatten)]
        options: ProjectOptions,
    },

    /// Manage templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },

    /// Add version control to an existing project
    SetupVcs {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Initialise DVC
        #[arg(long)]
        dvc: bool,

        /// Default DVC remote URL
        #[arg(long, requires = "dvc")]
        dvc_remote: Option<String>,

        /// Add a GitHub Actions workflow
        #[arg(long)]
        ci: bool,

        /// Do not install git hooks
        #[arg(long)]
        no_hooks: bool,

        /// Create develop, staging and experiment branches
        #[arg(long)]
        create_branches: bool,
    },

    /// Regenerate config/ files from the saved dependency report
    SetupConfig {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Target framework (tensorflow, pytorch, sklearn, generic)
        #[arg(long, value_parser = parse_framework)]
        framework: Option<Framework>,
    },

    /// Show the state of a generated project
    Status {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum TemplatesAction {
    /// List available templates
    List {
        /// Directory of custom *.tera templates
        #[arg(long)]
        templates: Option<PathBuf>,
    },

    /// Add a custom template
    Add {
        /// Template name, e.g. main.py
        name: String,

        /// Read the template from a file
        #[arg(long, conflicts_with = "content", required_unless_present = "content")]
        file: Option<PathBuf>,

        /// Template source given inline
        #[arg(long)]
        content: Option<String>,

        /// Directory of custom *.tera templates
        #[arg(long)]
        templates: Option<PathBuf>,
    },
}
