//! pip `requirements*.txt` files.

use crate::ecosystems::{
    Scanner, Updater, discover, has_template_syntax, read_for_scan, read_manifest, relative_path,
    split_lines, update_action, updatable_by_file, write_manifest,
};
use crate::error::Result;
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::RegistryClient;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

const EXCLUDED_DIRS: &[&str] = &[".git", ".venv"];

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_.-]+)\s*([=<>!~]{1,2})\s*([^\s;]+)")
        .expect("requirement pattern is valid")
});
static PINNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([A-Za-z0-9_.-]+)(\s*==\s*)([^\s;]+)(.*)$").expect("pinned pattern is valid")
});

pub(crate) fn is_requirements_file(name: &str) -> bool {
    name.starts_with("requirements") && name.ends_with(".txt")
}

fn pinned_version(operator: &str, version: &str) -> Option<String> {
    (operator == "==" && !has_template_syntax(version)).then(|| version.to_string())
}

pub struct RequirementsScanner {
    registry: Arc<dyn RegistryClient>,
}

impl RequirementsScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl Scanner for RequirementsScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, is_requirements_file)
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let contents = read_for_scan(path)?;
        let relative = relative_path(path, root);
        let mut records = Vec::new();

        for line in contents.lines() {
            let stripped = line.trim();
            if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with('-') {
                continue;
            }
            let Some(caps) = REQUIREMENT.captures(stripped) else {
                continue;
            };
            let (name, operator, version) = (&caps[1], &caps[2], &caps[3]);

            records.push(
                DependencyRecord::new(
                    Ecosystem::Python,
                    name,
                    relative.as_str(),
                    format!("{operator}{version}"),
                )
                .with_resolved(pinned_version(operator, version))
                .with_latest(self.registry.latest_version(name)),
            );
        }

        Ok(records)
    }
}

pub struct RequirementsUpdater;

impl Updater for RequirementsUpdater {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        let grouped = updatable_by_file(records, Ecosystem::Python, |r| {
            let file_name = r.file_path.rsplit('/').next().unwrap_or_default();
            is_requirements_file(file_name).then(|| r.name.to_lowercase())
        });

        for (file, deps) in grouped {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut output = String::with_capacity(contents.len());
            let mut dirty = false;

            for (line, terminator) in split_lines(&contents) {
                let rewritten = PINNED.captures(line).and_then(|caps| {
                    let name = caps.get(2)?.as_str();
                    let old = caps.get(4)?.as_str();
                    let latest = deps
                        .get(&name.to_lowercase())
                        .and_then(|dep| dep.latest_version.as_deref())?;
                    if actions.len() >= budget || old == latest || has_template_syntax(old) {
                        return None;
                    }
                    let new_line = format!("{}{}{}{}{}", &caps[1], name, &caps[3], latest, &caps[5]);
                    Some((new_line, name.to_string(), old.to_string(), latest))
                });

                match rewritten {
                    Some((new_line, name, old, latest)) => {
                        output.push_str(&new_line);
                        actions.push(update_action(
                            Ecosystem::Python,
                            &file,
                            &name,
                            &format!("=={old}"),
                            &format!("=={latest}"),
                            latest,
                        ));
                        dirty = true;
                    }
                    None => output.push_str(line),
                }
                output.push_str(terminator);
            }

            if dirty {
                write_manifest(&path, &output)?;
            }
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystems::testing::outdated;
    use crate::registry::testing::StaticRegistry;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn pinned_requirement_is_updated_end_to_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests==2.31.0\n").unwrap();

        let scanner = RequirementsScanner::new(Arc::new(StaticRegistry::new([("requests", "2.32.3")])));
        let records = scanner.scan_file(&path, dir.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resolved_version.as_deref(), Some("2.31.0"));
        assert_eq!(records[0].latest_version.as_deref(), Some("2.32.3"));
        assert!(records[0].update_available());

        let actions = RequirementsUpdater.apply_updates(dir.path(), &records, 10).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].old_spec, "==2.31.0");
        assert_eq!(actions[0].new_spec, "==2.32.3");
        assert_eq!(fs::read_to_string(&path).unwrap(), "requests==2.32.3\n");

        let again = RequirementsUpdater.apply_updates(dir.path(), &records, 10).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn only_exact_pins_resolve() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirements-dev.txt");
        fs::write(
            &path,
            "# tools\n-r requirements.txt\nflask>=2.0\nDjango == 4.2.1 ; python_version >= \"3.8\"\n\npytest~=7.4\n",
        )
        .unwrap();

        let scanner = RequirementsScanner::new(Arc::new(StaticRegistry::default()));
        let records = scanner.scan_file(&path, dir.path()).unwrap();

        let resolved: Vec<(&str, &str, Option<&str>)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.current_spec.as_str(), r.resolved_version.as_deref()))
            .collect();
        assert_eq!(
            resolved,
            vec![
                ("flask", ">=2.0", None),
                ("Django", "==4.2.1", Some("4.2.1")),
                ("pytest", "~=7.4", None),
            ]
        );
    }

    #[test]
    fn keeps_markers_and_matches_names_case_insensitively() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "  Django == 4.2.1 ; python_version >= \"3.8\"\r\nflask==2.0.0\r\n").unwrap();

        let records = vec![
            outdated(Ecosystem::Python, "django", "requirements.txt", None, "4.2.1", "4.2.16"),
            outdated(Ecosystem::Python, "flask", "requirements.txt", None, "2.0.0", "3.0.3"),
        ];

        let actions = RequirementsUpdater.apply_updates(dir.path(), &records, 1).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].dependency, "Django");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "  Django == 4.2.16 ; python_version >= \"3.8\"\r\nflask==2.0.0\r\n"
        );
    }

    #[test]
    fn ignores_pyproject_records() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pyproject.toml"), "[project]\n").unwrap();
        let records = vec![outdated(
            Ecosystem::Python,
            "requests",
            "pyproject.toml",
            Some("project.dependencies"),
            "2.31.0",
            "2.32.3",
        )];

        assert!(RequirementsUpdater.apply_updates(dir.path(), &records, 10).unwrap().is_empty());
    }
}
