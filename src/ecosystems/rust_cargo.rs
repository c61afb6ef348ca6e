//! `Cargo.toml` dependency tables.

use crate::ecosystems::{
    Scanner, Updater, discover, first_version_token, read_for_scan, read_manifest, relative_path,
    replace_first_version, update_action, updatable_by_file, write_manifest,
};
use crate::error::{DepError, Result};
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::RegistryClient;
use crate::utils::toml::TomlUtils;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use toml_edit::DocumentMut;

const EXCLUDED_DIRS: &[&str] = &[".git", "target"];
const DEPENDENCY_KEYS: &[&str] = &["dependencies", "dev-dependencies", "build-dependencies"];

static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.-]+)?").expect("cargo version pattern is valid")
});

/// Every dependency table a manifest may carry, as (section name, key path).
fn dependency_sections(target_names: &[String]) -> Vec<(String, Vec<String>)> {
    let mut sections: Vec<(String, Vec<String>)> = DEPENDENCY_KEYS
        .iter()
        .map(|key| (key.to_string(), vec![key.to_string()]))
        .collect();

    sections.push((
        "workspace.dependencies".to_string(),
        vec!["workspace".to_string(), "dependencies".to_string()],
    ));

    for target in target_names {
        for key in DEPENDENCY_KEYS {
            sections.push((
                format!("target.{target}.{key}"),
                vec!["target".to_string(), target.clone(), key.to_string()],
            ));
        }
    }

    sections
}

fn version_requirement(value: &toml::Value) -> Option<&str> {
    match value {
        toml::Value::String(spec) => Some(spec),
        toml::Value::Table(table) => table.get("version").and_then(|v| v.as_str()),
        _ => None,
    }
}

pub struct CargoScanner {
    registry: Arc<dyn RegistryClient>,
}

impl CargoScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl Scanner for CargoScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Rust
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, |name| name == "Cargo.toml")
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let manifest: toml::Table = toml::from_str(&read_for_scan(path)?)
            .map_err(|e| DepError::manifest_parse(path, e.message()))?;
        let relative = relative_path(path, root);

        let targets: Vec<String> = manifest
            .get("target")
            .and_then(|t| t.as_table())
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();

        let mut records = Vec::new();
        for (section, key_path) in dependency_sections(&targets) {
            let mut table = Some(&manifest);
            for key in &key_path {
                table = table.and_then(|t| t.get(key)).and_then(|v| v.as_table());
            }
            let Some(table) = table else {
                continue;
            };

            for (name, value) in table {
                let Some(spec) = version_requirement(value) else {
                    continue;
                };
                records.push(
                    DependencyRecord::new(Ecosystem::Rust, name.as_str(), relative.as_str(), spec)
                        .with_resolved(first_version_token(&VERSION_TOKEN, spec))
                        .with_latest(self.registry.latest_version(name))
                        .with_section(section.as_str()),
                );
            }
        }

        Ok(records)
    }
}

pub struct CargoUpdater;

impl Updater for CargoUpdater {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Rust
    }

    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        let grouped = updatable_by_file(records, Ecosystem::Rust, |r| {
            r.section.clone().map(|s| (s, r.name.to_lowercase()))
        });

        for (file, deps) in grouped {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut doc: DocumentMut = match contents.parse() {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "skipping unparseable Cargo.toml");
                    continue;
                }
            };

            let targets: Vec<String> = doc
                .get("target")
                .and_then(|t| t.as_table_like())
                .map(|t| t.iter().map(|(k, _)| k.to_string()).collect())
                .unwrap_or_default();
            let mut dirty = false;

            for (section, key_path) in dependency_sections(&targets) {
                let keys: Vec<&str> = key_path.iter().map(String::as_str).collect();
                let Some(table) = TomlUtils::table_at_mut(doc.as_table_mut(), &keys) else {
                    continue;
                };
                let names: Vec<String> = table.iter().map(|(k, _)| k.to_string()).collect();

                for name in names {
                    if actions.len() >= budget {
                        break;
                    }
                    let Some(latest) = deps
                        .get(&(section.clone(), name.to_lowercase()))
                        .and_then(|dep| dep.latest_version.as_deref())
                    else {
                        continue;
                    };
                    let Some(item) = table.get_mut(&name) else {
                        continue;
                    };
                    let Some(old) = TomlUtils::extract_version(item) else {
                        continue;
                    };
                    if first_version_token(&VERSION_TOKEN, &old).is_none() {
                        continue;
                    }
                    let Some(new) = replace_first_version(&VERSION_TOKEN, &old, latest) else {
                        continue;
                    };
                    if new == old {
                        continue;
                    }

                    if TomlUtils::update_version(item, &new) {
                        actions.push(update_action(Ecosystem::Rust, &file, &name, &old, &new, latest));
                        dirty = true;
                    }
                }
            }

            if dirty {
                write_manifest(&path, &doc.to_string())?;
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

    const MANIFEST: &str = r#"[package]
name = "demo"
version = "0.1.0"

[dependencies]
serde = { version = "1.0.100", features = ["derive"] } # core
anyhow = "1.0"
local = { path = "../local" }
shared = { workspace = true }

[dev-dependencies]
serde = "^1.0.100"

[target.'cfg(windows)'.dependencies]
winapi = "0.3.9"
"#;

    #[test]
    fn scans_every_dependency_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, MANIFEST).unwrap();

        let scanner = CargoScanner::new(Arc::new(StaticRegistry::new([("serde", "1.0.228")])));
        let records = scanner.scan_file(&path, dir.path()).unwrap();

        let summary: Vec<(&str, &str, Option<&str>)> = records
            .iter()
            .map(|r| {
                (
                    r.section.as_deref().unwrap_or_default(),
                    r.name.as_str(),
                    r.resolved_version.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("dependencies", "anyhow", None),
                ("dependencies", "serde", Some("1.0.100")),
                ("dev-dependencies", "serde", Some("1.0.100")),
                ("target.cfg(windows).dependencies", "winapi", Some("0.3.9")),
            ]
        );
    }

    #[test]
    fn updates_by_section_and_preserves_formatting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, MANIFEST).unwrap();

        let records = vec![
            outdated(Ecosystem::Rust, "serde", "Cargo.toml", Some("dev-dependencies"), "1.0.100", "1.0.228"),
            outdated(
                Ecosystem::Rust,
                "winapi",
                "Cargo.toml",
                Some("target.cfg(windows).dependencies"),
                "0.3.9",
                "0.3.10",
            ),
        ];

        let actions = CargoUpdater.apply_updates(dir.path(), &records, 10).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].old_spec, "^1.0.100");
        assert_eq!(actions[0].new_spec, "^1.0.228");

        let expected = MANIFEST
            .replace("serde = \"^1.0.100\"", "serde = \"^1.0.228\"")
            .replace("winapi = \"0.3.9\"", "winapi = \"0.3.10\"");
        assert_eq!(fs::read_to_string(&path).unwrap(), expected);

        assert!(CargoUpdater.apply_updates(dir.path(), &records, 10).unwrap().is_empty());
    }

    #[test]
    fn invalid_manifest_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, "[dependencies\nserde = ").unwrap();

        let scanner = CargoScanner::new(Arc::new(StaticRegistry::default()));
        assert!(matches!(
            scanner.scan_file(&path, dir.path()),
            Err(DepError::ManifestParse { .. })
        ));
    }
}
