// Git and DVC integration
//
// Thin wrappers over the `git` and `dvc` executables. Every failure is an
// `Error::Command`; `setup` turns them into warnings so a missing tool
// never undoes a project that was already written.

use crate::config::VcsConfig;
use crate::convert::RenderedFile;
use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

const DEFAULT_USER_NAME: &str = "nbforge";
const DEFAULT_USER_EMAIL: &str = "nbforge@localhost";

/// Branches created next to the default branch when requested
pub const DEFAULT_BRANCHES: &[&str] = &[
    "develop",
    "staging",
    "experiment/data-preprocessing",
    "experiment/model-tuning",
];

/// Run a program in a directory and return its trimmed stdout
fn run(program: &str, args: &[&str], cwd: &Path) -> Result<String> {
    tracing::debug!(program, ?args, cwd = %cwd.display(), "running");
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::command(program, "not installed or not on PATH"),
            _ => Error::command(program, e.to_string()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("exited with {}", output.status),
            text => text.to_string(),
        };
        return Err(Error::command(format!("{} {}", program, args.join(" ")), message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
fn is_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Repository state reported by `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitStatus {
    pub branch: String,
    pub commits: usize,
    /// Entries of `git status --porcelain`
    pub changes: usize,
}

/// A git working tree
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    /// Open an existing repository rooted at `root`
    pub fn open(root: &Path) -> Option<Self> {
        root.join(".git").exists().then(|| Self {
            root: root.to_path_buf(),
        })
    }

    /// `git init` in `root`
    pub fn init(root: &Path) -> Result<Self> {
        run("git", &["init", "--quiet"], root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        run("git", args, &self.root)
    }

    /// Stage everything and commit
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "--all"])?;

        let has_identity = self
            .git(&["config", "user.email"])
            .map(|email| !email.is_empty())
            .unwrap_or(false);
        let name = format!("user.name={}", DEFAULT_USER_NAME);
        let email = format!("user.email={}", DEFAULT_USER_EMAIL);
        let mut args = Vec::new();
        if !has_identity {
            args.extend(["-c", name.as_str(), "-c", email.as_str()]);
        }
        args.extend(["commit", "--quiet", "-m", message]);
        self.git(&args)?;
        Ok(())
    }

    /// Whether the working tree has anything to commit
    pub fn has_changes(&self) -> Result<bool> {
        Ok(!self.git(&["status", "--porcelain"])?.trim().is_empty())
    }

    /// Create a branch at `HEAD` without switching to it
    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.git(&["branch", name])?;
        Ok(())
    }

    /// Write hook scripts into `.git/hooks` and make them executable
    pub fn install_hooks(&self, hooks: &[RenderedFile]) -> Result<usize> {
        let dir = self.root.join(".git").join("hooks");
        fs::create_dir_all(&dir)?;
        for hook in hooks {
            let path = dir.join(&hook.path);
            fs::write(&path, &hook.content)?;
            make_executable(&path)?;
            tracing::debug!(hook = %hook.path.display(), "installed hook");
        }
        Ok(hooks.len())
    }

    pub fn status(&self) -> Result<GitStatus> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        // An unborn branch has no commits to count
        let commits = self
            .git(&["rev-list", "--count", "HEAD"])
            .ok()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let changes = self
            .git(&["status", "--porcelain"])?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        Ok(GitStatus {
            branch,
            commits,
            changes,
        })
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// `dvc init` plus an optional default remote
pub fn dvc_init(root: &Path, remote: Option<&str>) -> Result<()> {
    run("dvc", &["init", "--quiet"], root)?;
    if let Some(url) = remote {
        run("dvc", &["remote", "add", "--default", "storage", url], root)?;
    }
    Ok(())
}

/// What `setup` managed to do
#[derive(Debug, Default)]
pub struct VcsReport {
    pub git: bool,
    pub hooks: usize,
    pub dvc: bool,
    pub committed: bool,
    pub branches: Vec<String>,
    pub warnings: Vec<String>,
}

/// Initialise version control for a written project
///
/// Runs `git init`, `dvc init`, the initial commit, hook installation and
/// branch creation in that order. Each step that fails is recorded as a
/// warning and the remaining steps that do not depend on it still run.
pub fn setup(root: &Path, config: &VcsConfig, hooks: &[RenderedFile]) -> VcsReport {
    let mut report = VcsReport::default();

    let git = if config.git {
        match Git::open(root).map(Ok).unwrap_or_else(|| Git::init(root)) {
            Ok(git) => {
                report.git = true;
                Some(git)
            }
            Err(e) => {
                report.warnings.push(format!("git init skipped: {}", e));
                None
            }
        }
    } else {
        None
    };

    if config.dvc {
        match dvc_init(root, config.dvc_remote.as_deref()) {
            Ok(()) => report.dvc = true,
            Err(e) => report.warnings.push(format!("dvc init skipped: {}", e)),
        }
    }

    if let Some(git) = &git {
        // Commit before the hooks exist so their checks cannot reject it
        match git.has_changes() {
            Ok(false) => {}
            Ok(true) => match git.commit_all("Initial commit: converted from notebook") {
                Ok(()) => report.committed = true,
                Err(e) => report.warnings.push(format!("initial commit skipped: {}", e)),
            },
            Err(e) => report.warnings.push(format!("initial commit skipped: {}", e)),
        }

        match git.install_hooks(hooks) {
            Ok(n) => report.hooks = n,
            Err(e) => report.warnings.push(format!("hooks not installed: {}", e)),
        }

        if config.branches {
            for branch in DEFAULT_BRANCHES {
                match git.create_branch(branch) {
                    Ok(()) => report.branches.push(branch.to_string()),
                    Err(e) => report.warnings.push(format!("branch {} not created: {}", branch, e)),
                }
            }
        }
    }

    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }
    report
}
