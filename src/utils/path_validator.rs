use crate::error::{DepError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

const FORBIDDEN: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

/// Path checks for the clone directory and the manifests inside it.
pub struct PathValidator;

impl PathValidator {
    /// Creates (if needed) and canonicalises the directory that receives clones.
    pub fn validate_clone_base(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        Self::reject_system_path(path)?;

        fs::create_dir_all(path).map_err(|e| {
            DepError::ProjectValidation(format!(
                "Cannot create clone directory '{}': {e}",
                path.display()
            ))
        })?;

        let canonical = path.canonicalize().map_err(|e| {
            DepError::ProjectValidation(format!("Invalid path '{}': {e}", path.display()))
        })?;

        if !canonical.is_dir() {
            return Err(DepError::ProjectValidation(format!(
                "Path '{}' is not a directory",
                canonical.display()
            )));
        }

        Self::reject_system_path(&canonical)?;
        Ok(canonical)
    }

    fn reject_system_path(path: &Path) -> Result<()> {
        for forbidden in FORBIDDEN {
            let forbidden_path = Path::new(forbidden);
            let canonical_forbidden = forbidden_path.canonicalize().ok();

            if path.starts_with(forbidden_path)
                || canonical_forbidden.is_some_and(|f| path.starts_with(f))
            {
                return Err(DepError::ProjectValidation(format!(
                    "Access to system directory '{forbidden}' is not allowed"
                )));
            }
        }
        Ok(())
    }

    /// Resolves `relative` against `root` and ensures the result stays inside it.
    pub fn validate_file_path(relative: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let root = root.as_ref();

        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(DepError::ProjectValidation(format!(
                "Manifest path '{}' escapes the repository",
                relative.display()
            )));
        }

        let canonical_root = root.canonicalize().map_err(|e| {
            DepError::ProjectValidation(format!("Invalid repository root '{}': {e}", root.display()))
        })?;

        let candidate = canonical_root.join(relative);
        let canonical_file = candidate.canonicalize().map_err(|e| {
            DepError::ProjectValidation(format!("Invalid file path '{}': {e}", candidate.display()))
        })?;

        if !canonical_file.starts_with(&canonical_root) {
            return Err(DepError::ProjectValidation(
                "File path is outside the repository".to_string(),
            ));
        }

        Ok(canonical_file)
    }

    /// `path` relative to `root`, always `/`-separated.
    pub fn relative_display(path: &Path, root: &Path) -> String {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
