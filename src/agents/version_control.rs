use crate::error::{DepError, Result};
use crate::utils::credentials::redact_secret;
use crate::utils::path_validator::PathValidator;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const DEFAULT_AUTHOR_NAME: &str = "depdetective[bot]";
const DEFAULT_AUTHOR_EMAIL: &str = "depdetective-bot@users.noreply.github.com";
const FALLBACK_BRANCH: &str = "main";

/// VersionControlAgent drives the git CLI inside one cloned working tree.
///
/// Every failing command surfaces as [`DepError::GitOperation`] with URL
/// credentials masked in both the command line and stderr.
#[derive(Debug)]
pub struct VersionControlAgent {
    repo_path: PathBuf,
}

impl VersionControlAgent {
    /// Opens an existing working tree.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self> {
        let repo_path = Self::validate_git_path(repo_path.as_ref())?;
        Ok(Self { repo_path })
    }

    /// Shallow-clones `base_branch` of `url` into `destination`.
    pub fn clone_repository(url: &str, destination: &Path, base_branch: &str) -> Result<Self> {
        Self::validate_ref_name(base_branch)?;
        let destination_str = destination.to_string_lossy().into_owned();
        let output = Self::run_git_in(
            None,
            &["clone", "--depth", "1", "--branch", base_branch, url, destination_str.as_str()],
        )?;
        Self::ensure_success(&output, &["clone", "--depth", "1", "--branch", base_branch, url])?;
        tracing::info!(branch = base_branch, path = %destination.display(), "repository cloned");
        Self::new(destination)
    }

    /// Branch the remote `HEAD` points at, or `main` when it cannot be read.
    pub fn detect_default_branch(url: &str) -> Result<String> {
        let args = ["ls-remote", "--symref", url, "HEAD"];
        let output = Self::run_git_in(None, &args)?;
        Self::ensure_success(&output, &args)?;
        Ok(Self::parse_symref(&String::from_utf8_lossy(&output.stdout)))
    }

    fn parse_symref(listing: &str) -> String {
        listing
            .lines()
            .filter(|line| line.starts_with("ref: ") && line.ends_with("\tHEAD"))
            .find_map(|line| line.split_whitespace().nth(1))
            .map(|reference| reference.trim_start_matches("refs/heads/").to_string())
            .unwrap_or_else(|| FALLBACK_BRANCH.to_string())
    }

    pub fn path(&self) -> &Path {
        &self.repo_path
    }

    pub fn configure_identity(&self) -> Result<()> {
        let name = env::var("GIT_AUTHOR_NAME").unwrap_or_else(|_| DEFAULT_AUTHOR_NAME.to_string());
        let email =
            env::var("GIT_AUTHOR_EMAIL").unwrap_or_else(|_| DEFAULT_AUTHOR_EMAIL.to_string());
        self.git(&["config", "user.name", name.as_str()])?;
        self.git(&["config", "user.email", email.as_str()])?;
        Ok(())
    }

    /// Points `branch` at the remote tip of `base_branch`, discarding any
    /// previous state of the automation branch.
    pub fn create_or_reset_branch(&self, branch: &str, base_branch: &str) -> Result<()> {
        Self::validate_ref_name(branch)?;
        Self::validate_ref_name(base_branch)?;
        self.git(&["fetch", "origin", base_branch])?;
        let upstream = format!("origin/{base_branch}");
        self.git(&["checkout", "-B", branch, upstream.as_str()])?;
        Ok(())
    }

    /// Check if the working tree has uncommitted changes
    pub fn has_changes(&self) -> Result<bool> {
        let status = self.git(&["status", "--porcelain"])?;
        Ok(!status.trim().is_empty())
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "."])?;
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    /// Force-pushes `branch`, leasing against the tip it has on the remote
    /// right now so a branch left by an earlier run is overwritten.
    pub fn push(&self, branch: &str) -> Result<()> {
        Self::validate_ref_name(branch)?;
        let existed = self.fetch_remote_tip(branch)?;
        self.git(&["push", "--force-with-lease", "origin", branch])?;
        tracing::info!(branch, replaced = existed, "branch pushed");
        Ok(())
    }

    /// Updates `origin/<branch>` from the remote. Returns false when the
    /// remote has no such branch yet.
    fn fetch_remote_tip(&self, branch: &str) -> Result<bool> {
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        let args = ["fetch", "--depth", "1", "origin", refspec.as_str()];
        let output = Self::run_git_in(Some(&self.repo_path), &args)?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("couldn't find remote ref") {
            tracing::debug!(branch, "automation branch not on remote yet");
            return Ok(false);
        }
        Self::ensure_success(&output, &args)?;
        Ok(false)
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Self::run_git_in(Some(&self.repo_path), args)?;
        Self::ensure_success(&output, args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_git_in(cwd: Option<&Path>, args: &[&str]) -> Result<Output> {
        let mut command = Command::new("git");
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(command = %redact_secret(&args.join(" ")), "running git");
        command.output().map_err(|e| {
            DepError::GitOperation(format!(
                "Failed to execute git command '{}': {e}",
                redact_secret(&args.join(" "))
            ))
        })
    }

    fn ensure_success(output: &Output, args: &[&str]) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }

        Err(DepError::GitOperation(format!(
            "git {} failed: {}",
            redact_secret(&args.join(" ")),
            redact_secret(String::from_utf8_lossy(&output.stderr).trim())
        )))
    }

    fn validate_git_path(path: &Path) -> Result<PathBuf> {
        let dangerous = [';', '|', '&', '$', '`', '\n', '\r'];
        let path_str = path.to_string_lossy();
        if let Some(ch) = dangerous.iter().find(|c| path_str.contains(**c)) {
            return Err(DepError::GitOperation(format!(
                "Path contains dangerous character: '{ch}'"
            )));
        }

        if !path.is_absolute() {
            return Err(DepError::GitOperation(
                "Only absolute paths are allowed for Git operations".to_string(),
            ));
        }

        PathValidator::validate_clone_base(path)
            .map_err(|err| DepError::GitOperation(format!("Invalid Git path: {err}")))
    }

    fn validate_ref_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && !name.starts_with('-')
            && !name.contains("..")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'));

        if valid {
            Ok(())
        } else {
            Err(DepError::GitOperation(format!("Invalid branch name '{name}'")))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::process::Command;

    pub fn git(cwd: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .current_dir(cwd)
            .args(args)
            .output()
            .expect("git is installed");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Creates a bare `origin.git` whose `main` holds `files`; returns its path.
    pub fn seeded_remote(dir: &Path, files: &[(&str, &str)]) -> std::path::PathBuf {
        let remote = dir.join("origin.git");
        let seed = dir.join("seed");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&seed).unwrap();

        git(&remote, &["init", "--bare", "--initial-branch=main"]);
        git(&seed, &["init", "--initial-branch=main"]);
        git(&seed, &["config", "user.name", "Seed"]);
        git(&seed, &["config", "user.email", "seed@example.test"]);
        for (path, contents) in files {
            let full = seed.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, contents).unwrap();
        }
        git(&seed, &["add", "."]);
        git(&seed, &["commit", "-m", "initial"]);
        git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        git(&seed, &["push", "origin", "main"]);
        remote
    }

    /// `file://` URL for a local repository, accepted by shallow clones.
    pub fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }
}
