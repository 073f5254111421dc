//! CLI module for nbforge

mod args;

pub use args::{Args, Command, ProjectOptions, TemplatesAction};

use crate::config::{CliOverrides, Config};
use crate::convert::{Conversion, Converter};
use crate::error::{Error, Result, Step};
use crate::output::{BuiltinTemplates, CustomTemplates, TemplateRegistry, TEMPLATE_EXTENSION};
use crate::scaffold::{ProjectStatus, ProjectWriter};
use crate::vcs;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "nbforge.toml";

/// Where `templates add` writes when no directory is configured
pub const DEFAULT_TEMPLATE_DIR: &str = "nbforge-templates";

/// Run the CLI application
pub fn run() -> ExitCode {
    let args = Args::parse_args();
    init_logging(args.log_level());

    match execute(args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber; `RUST_LOG` overrides the flag level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn execute(args: Args) -> Result<()> {
    let config_path = args.config.clone();

    match args.command {
        Command::Convert {
            notebooks,
            name,
            options,
        } => {
            let cfg = load_config(config_path.as_deref(), options.overrides(name))?;
            convert(&notebooks, cfg)
        }

        Command::Init { name, options } => {
            let mut overrides = options.overrides(Some(name.clone()));
            if overrides.output.is_none() {
                overrides.output = Some(PathBuf::from(&name));
            }
            let cfg = load_config(config_path.as_deref(), overrides)?;
            init(cfg)
        }

        Command::Templates { action } => match action {
            TemplatesAction::List { templates } => {
                let cfg = load_config(
                    config_path.as_deref(),
                    CliOverrides {
                        templates,
                        ..CliOverrides::default()
                    },
                )?;
                list_templates(&cfg)
            }
            TemplatesAction::Add {
                name,
                file,
                content,
                templates,
            } => {
                let cfg = load_config(
                    config_path.as_deref(),
                    CliOverrides {
                        templates,
                        ..CliOverrides::default()
                    },
                )?;
                let content = match (file, content) {
                    (Some(path), _) => std::fs::read_to_string(&path)?,
                    (None, Some(content)) => content,
                    (None, None) => return Err(Error::other("either --file or --content is required")),
                };
                add_template(&cfg, &name, &content)
            }
        },

        Command::SetupVcs {
            path,
            dvc,
            dvc_remote,
            ci,
            no_hooks,
            create_branches,
        } => {
            let overrides = CliOverrides {
                git: true,
                dvc,
                dvc_remote,
                ci,
                branches: create_branches,
                ..CliOverrides::default()
            };
            let mut cfg = load_config(config_path.as_deref(), overrides)?;
            if no_hooks {
                cfg.vcs.hooks = false;
            }
            setup_vcs(&path, cfg)
        }

        Command::SetupConfig { path, framework } => {
            let cfg = load_config(
                config_path.as_deref(),
                CliOverrides {
                    framework,
                    ..CliOverrides::default()
                },
            )?;
            setup_config(&path, cfg)
        }

        Command::Status { path } => status(&path),

        Command::Version => {
            println!("nbforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load the config file, apply CLI overrides and validate
fn load_config(path: Option<&Path>, overrides: CliOverrides) -> Result<Config> {
    let mut cfg = match path {
        // An explicitly named config must load
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG_FILE)),
    };
    cfg.merge_cli(overrides);
    cfg.validate()?;
    Ok(cfg)
}

/// Built-in templates plus the configured custom directory, if any
fn load_registry(cfg: &Config) -> Result<CustomTemplates> {
    let builtin = BuiltinTemplates::new()?;
    match &cfg.templates.directory {
        Some(dir) => {
            let registry = CustomTemplates::from_dir(builtin, dir)?;
            tracing::info!(
                count = registry.custom_names().len(),
                dir = %dir.display(),
                "loaded custom templates"
            );
            Ok(registry)
        }
        None => Ok(CustomTemplates::new(builtin)),
    }
}

fn convert(notebooks: &[PathBuf], cfg: Config) -> Result<()> {
    for notebook in notebooks {
        if !notebook.is_file() {
            return Err(Error::PathNotFound(notebook.clone()));
        }
    }

    let writer = ProjectWriter::from_config(&cfg.output);
    let converter = Converter::new(cfg.clone(), load_registry(&cfg)?);

    if let [notebook] = notebooks {
        println!("Converting {}...", notebook.display());
        let conversion = converter.convert_file(notebook)?;
        println!("{}", conversion.summary());
        return write_project(&conversion, &writer, &cfg);
    }

    // Several notebooks: one project subdirectory each
    let mut seen = HashSet::new();
    for notebook in notebooks {
        let dir = project_dir_name(notebook);
        if !seen.insert(dir.clone()) {
            return Err(Error::other(format!(
                "more than one notebook would be written to '{}'",
                dir
            )));
        }
    }

    println!("Converting {} notebooks...", notebooks.len());
    let bar = ProgressBar::new(notebooks.len() as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} notebooks",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }

    let results: Vec<(&PathBuf, Result<Conversion>)> = notebooks
        .par_iter()
        .map(|notebook| {
            let result = converter.convert_file(notebook);
            bar.inc(1);
            (notebook, result)
        })
        .collect();
    bar.finish_and_clear();

    let mut failed = 0;
    for (notebook, result) in results {
        let outcome = result.and_then(|conversion| {
            println!("{}: {}", notebook.display(), conversion.summary());
            let writer = writer.with_root(writer.root().join(project_dir_name(notebook)));
            write_project(&conversion, &writer, &cfg)
        });
        if let Err(e) = outcome {
            eprintln!("Error: {}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(Error::other(format!(
            "{} of {} notebooks failed to convert",
            failed,
            notebooks.len()
        )));
    }
    println!("Converted {} notebooks into {}", notebooks.len(), writer.root().display());
    Ok(())
}

fn project_dir_name(notebook: &Path) -> String {
    notebook
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("project")
        .to_string()
}

fn init(cfg: Config) -> Result<()> {
    let writer = ProjectWriter::from_config(&cfg.output);
    let converter = Converter::new(cfg.clone(), load_registry(&cfg)?);

    println!("Creating project {}...", cfg.project.name);
    let conversion = converter.scaffold()?;
    write_project(&conversion, &writer, &cfg)
}

/// Write a finished conversion and run the optional VCS setup
fn write_project(conversion: &Conversion, writer: &ProjectWriter, cfg: &Config) -> Result<()> {
    let report = writer
        .write(conversion)
        .map_err(|e| e.during(&conversion.notebook, Step::Write))?;
    println!("{}", report.summary());

    for warning in &conversion.warnings {
        println!("Warning: {}", warning);
    }

    if cfg.vcs.git || cfg.vcs.dvc {
        print_vcs_report(&vcs::setup(writer.root(), &cfg.vcs, &conversion.hooks));
    }

    println!("Project written to: {}", writer.root().display());
    Ok(())
}

fn print_vcs_report(report: &vcs::VcsReport) {
    if report.git {
        println!(
            "Initialized git repository ({} hooks{})",
            report.hooks,
            if report.committed { ", initial commit" } else { "" }
        );
    }
    if !report.branches.is_empty() {
        println!("Created branches: {}", report.branches.join(", "));
    }
    if report.dvc {
        println!("Initialized DVC");
    }
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
}

/// Add git, hooks, DVC and CI to a project that is already on disk
fn setup_vcs(root: &Path, cfg: Config) -> Result<()> {
    let converter = Converter::new(cfg.clone(), load_registry(&cfg)?);
    let (project, _) = converter.load_project(root)?;

    // Written first so the initial commit includes it
    if cfg.vcs.ci {
        let workflow = converter.render_ci(&project)?;
        ProjectWriter::new(root, project.structure, true).update(std::slice::from_ref(&workflow))?;
        println!("Created {}", workflow.path.display());
    }

    let hooks = converter.render_hooks(&project)?;
    print_vcs_report(&vcs::setup(root, &cfg.vcs, &hooks));

    if let Some(git) = vcs::Git::open(root) {
        match git.status() {
            Ok(status) => println!(
                "Repository: branch {}, {} commits",
                status.branch, status.commits
            ),
            Err(e) => println!("Warning: {}", e),
        }
    }
    Ok(())
}

/// Rewrite the config/ files of an existing project
fn setup_config(root: &Path, cfg: Config) -> Result<()> {
    let converter = Converter::new(cfg.clone(), load_registry(&cfg)?);
    let (project, report) = converter.load_project(root)?;
    let files = converter.render_config_files(&project, &report)?;
    let written = ProjectWriter::new(root, project.structure, true).update(&files)?;

    println!(
        "Configuration files for {} ({}, {} dependencies):",
        project.name,
        project.framework,
        report.len()
    );
    for path in &written.files {
        println!("  {}", path.display());
    }
    Ok(())
}

fn list_templates(cfg: &Config) -> Result<()> {
    let registry = load_registry(cfg)?;
    let custom: HashSet<String> = registry.custom_names().into_iter().collect();

    println!("Templates:");
    for name in registry.names() {
        if custom.contains(&name) {
            println!("  {} (custom)", name);
        } else {
            println!("  {}", name);
        }
    }
    Ok(())
}

fn add_template(cfg: &Config, name: &str, content: &str) -> Result<()> {
    let dir = cfg
        .templates
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR));

    // Compile before touching the directory
    let mut registry = CustomTemplates::new(BuiltinTemplates::new()?);
    registry.register(name, content)?;

    let path = dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content)?;

    println!("Added template '{}' at {}", name, path.display());
    if cfg.templates.directory.is_none() {
        println!("Use it with --templates {}", dir.display());
    }
    Ok(())
}

fn status(path: &Path) -> Result<()> {
    let status = ProjectStatus::inspect(path)?;

    println!("Project: {}", status.root.display());
    println!("Layout: {:?}", status.structure);
    if status.code_files.is_empty() {
        println!("Code files: none");
    } else {
        println!("Code files: {}", status.code_files.join(", "));
    }
    if !status.config_files.is_empty() {
        println!("Config files: {}", status.config_files.join(", "));
    }
    match status.requirements {
        Some(n) => println!("Requirements: {}", n),
        None => println!("Requirements: missing requirements.txt"),
    }
    match &status.git {
        Some(git) => println!(
            "Git: branch {}, {} commits, {} uncommitted changes",
            git.branch, git.commits, git.changes
        ),
        None => println!("Git: not initialized"),
    }
    println!("DVC: {}", if status.dvc { "initialized" } else { "not initialized" });
    println!("CI: {}", if status.ci { "configured" } else { "not configured" });
    Ok(())
}
