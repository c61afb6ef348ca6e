//! npm `package.json` manifests.

use crate::ecosystems::{
    Scanner, Updater, discover, first_version_token, read_for_scan, read_manifest, relative_path,
    update_action, updatable_by_file, write_manifest,
};
use crate::error::{DepError, Result};
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::RegistryClient;
use regex::Regex;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules"];
const SECTIONS: &[&str] = &["dependencies", "devDependencies"];
const DEFAULT_INDENT: &str = "  ";

static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("npm version pattern is valid"));

/// First version embedded in an npm range. Protocol specs such as `npm:`,
/// `file:` or `git+https://` and `user/repo` shorthands never resolve.
fn resolved_version(spec: &str) -> Option<String> {
    if spec.contains(':') || spec.contains('/') {
        return None;
    }
    first_version_token(&VERSION_TOKEN, spec)
}

fn range_prefix(spec: &str) -> &'static str {
    if spec.starts_with('^') {
        "^"
    } else if spec.starts_with('~') {
        "~"
    } else {
        ""
    }
}

fn spec_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Indentation used by the first indented line of `contents`.
fn detect_indent(contents: &str) -> String {
    contents
        .lines()
        .skip(1)
        .find_map(|line| {
            let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            (!indent.is_empty()).then_some(indent)
        })
        .unwrap_or_else(|| DEFAULT_INDENT.to_string())
}

fn render(manifest: &Map<String, Value>, indent: &str, trailing_newline: bool) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    manifest.serialize(&mut serializer)?;

    let mut rendered = String::from_utf8_lossy(&buf).into_owned();
    if trailing_newline {
        rendered.push('\n');
    }
    Ok(rendered)
}

pub struct PackageJsonScanner {
    registry: Arc<dyn RegistryClient>,
}

impl PackageJsonScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl Scanner for PackageJsonScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Node
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, |name| name == "package.json")
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let manifest: Value = serde_json::from_str(&read_for_scan(path)?)
            .map_err(|e| DepError::manifest_parse(path, e))?;
        let relative = relative_path(path, root);
        let mut records = Vec::new();

        for section in SECTIONS {
            let Some(deps) = manifest.get(section).and_then(Value::as_object) else {
                continue;
            };
            for (name, value) in deps {
                let spec = spec_text(value);
                records.push(
                    DependencyRecord::new(Ecosystem::Node, name.as_str(), relative.as_str(), spec.as_str())
                        .with_resolved(resolved_version(&spec))
                        .with_latest(self.registry.latest_version(name))
                        .with_section(*section),
                );
            }
        }

        Ok(records)
    }
}

pub struct PackageJsonUpdater;

impl Updater for PackageJsonUpdater {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Node
    }

    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        // npm package names are case-sensitive.
        let grouped = updatable_by_file(records, Ecosystem::Node, |r| {
            let section = r.section.clone().unwrap_or_else(|| SECTIONS[0].to_string());
            Some((section, r.name.clone()))
        });

        for (file, deps) in grouped {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut manifest: Map<String, Value> = match serde_json::from_str(&contents) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "skipping unparseable package.json");
                    continue;
                }
            };
            let mut dirty = false;

            for section in SECTIONS {
                let Some(section_deps) = manifest.get_mut(*section).and_then(Value::as_object_mut) else {
                    continue;
                };

                for (name, value) in section_deps.iter_mut() {
                    if actions.len() >= budget {
                        break;
                    }
                    let Some(latest) = deps
                        .get(&(section.to_string(), name.clone()))
                        .and_then(|dep| dep.latest_version.as_deref())
                    else {
                        continue;
                    };
                    let Value::String(old) = value else {
                        continue;
                    };
                    if resolved_version(old).is_none() {
                        continue;
                    }

                    let new = format!("{}{}", range_prefix(old), latest);
                    if *old == new {
                        continue;
                    }
                    actions.push(update_action(Ecosystem::Node, &file, name, old, &new, latest));
                    *value = Value::String(new);
                    dirty = true;
                }
            }

            if dirty {
                let rendered = render(&manifest, &detect_indent(&contents), contents.ends_with('\n'))?;
                write_manifest(&path, &rendered)?;
            }
        }

        Ok(actions)
    }
}
