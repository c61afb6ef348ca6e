//! `pyproject.toml`: PEP 621 requirement arrays and Poetry dependency tables.

use crate::ecosystems::{
    Scanner, Updater, discover, first_version_token, has_template_syntax, read_for_scan,
    read_manifest, relative_path, replace_first_version, update_action, updatable_by_file,
    write_manifest,
};
use crate::error::{DepError, Result};
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::RegistryClient;
use crate::utils::toml::TomlUtils;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use toml_edit::{Array, DocumentMut, Item, Table, TableLike};

const EXCLUDED_DIRS: &[&str] = &[".git", ".venv", "node_modules"];
const MANIFEST: &str = "pyproject.toml";

static PEP508_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_.-]+)(?:\[[^\]]+\])?").expect("requirement name pattern is valid")
});
static PEP508_PINNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([A-Za-z0-9_.-]+)(\[[^\]]+\])?(\s*==\s*)([^\s;,@]+)(.*)$")
        .expect("pinned requirement pattern is valid")
});
static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("poetry version pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Array of PEP 508 requirement strings.
    Requirements,
    /// Poetry `name = spec` table.
    Poetry,
}

#[derive(Debug, Clone)]
struct Section {
    name: String,
    path: Vec<String>,
    shape: Shape,
}

impl Section {
    fn new(shape: Shape, path: &[&str]) -> Self {
        Self {
            name: path.join("."),
            path: path.iter().map(|s| s.to_string()).collect(),
            shape,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

fn table_keys(root: &Table, path: &[&str]) -> Vec<String> {
    TomlUtils::table_at(root, path)
        .map(|t| t.iter().map(|(k, _)| k.to_string()).collect())
        .unwrap_or_default()
}

/// Dependency sections present in the document, in declaration order.
fn sections(root: &Table) -> Vec<Section> {
    let mut found = vec![Section::new(Shape::Requirements, &["project", "dependencies"])];
    for group in table_keys(root, &["project", "optional-dependencies"]) {
        found.push(Section::new(
            Shape::Requirements,
            &["project", "optional-dependencies", group.as_str()],
        ));
    }
    found.push(Section::new(Shape::Poetry, &["tool", "poetry", "dependencies"]));
    for group in table_keys(root, &["tool", "poetry", "group"]) {
        found.push(Section::new(
            Shape::Poetry,
            &["tool", "poetry", "group", group.as_str(), "dependencies"],
        ));
    }
    found
}

fn requirement_array<'a>(root: &'a Table, keys: &[&str]) -> Option<&'a Array> {
    let (last, parent) = keys.split_last()?;
    TomlUtils::table_at(root, parent)?.get(last)?.as_array()
}

fn requirement_array_mut<'a>(root: &'a mut Table, keys: &[&str]) -> Option<&'a mut Array> {
    let (last, parent) = keys.split_last()?;
    TomlUtils::table_at_mut(root, parent)?.get_mut(last)?.as_array_mut()
}

/// (name, spec, pinned version) of a PEP 508 requirement string.
fn parse_requirement(entry: &str) -> Option<(String, String, Option<String>)> {
    let name_match = PEP508_NAME.captures(entry)?;
    let name = name_match.get(1)?.as_str().to_string();

    if let Some(pinned) = PEP508_PINNED.captures(entry) {
        let version = &pinned[5];
        let resolved = (!has_template_syntax(version)).then(|| version.to_string());
        return Some((name, format!("=={version}"), resolved));
    }

    let rest = entry[name_match.get(0)?.end()..].trim().to_string();
    Some((name, rest, None))
}

fn poetry_spec(item: &Item) -> Option<String> {
    TomlUtils::extract_version(item)
}

pub struct PyprojectScanner {
    registry: Arc<dyn RegistryClient>,
}

impl PyprojectScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    fn record(&self, name: &str, file: &str, spec: &str, resolved: Option<String>, section: &str) -> DependencyRecord {
        DependencyRecord::new(Ecosystem::Python, name, file, spec)
            .with_resolved(resolved)
            .with_latest(self.registry.latest_version(name))
            .with_section(section)
    }
}

impl Scanner for PyprojectScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, |name| name == MANIFEST)
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let doc: DocumentMut = read_for_scan(path)?
            .parse()
            .map_err(|e| DepError::manifest_parse(path, e))?;
        let relative = relative_path(path, root);
        let mut records = Vec::new();

        for section in sections(doc.as_table()) {
            let keys = section.keys();
            match section.shape {
                Shape::Requirements => {
                    let Some(array) = requirement_array(doc.as_table(), &keys) else {
                        continue;
                    };
                    for entry in array.iter().filter_map(|v| v.as_str()) {
                        let Some((name, spec, resolved)) = parse_requirement(entry) else {
                            continue;
                        };
                        records.push(self.record(&name, &relative, &spec, resolved, &section.name));
                    }
                }
                Shape::Poetry => {
                    let Some(table) = TomlUtils::table_at(doc.as_table(), &keys) else {
                        continue;
                    };
                    for (name, item) in table.iter() {
                        if name.eq_ignore_ascii_case("python") {
                            continue;
                        }
                        let Some(spec) = poetry_spec(item) else {
                            continue;
                        };
                        let resolved = first_version_token(&VERSION_TOKEN, &spec);
                        records.push(self.record(name, &relative, &spec, resolved, &section.name));
                    }
                }
            }
        }

        Ok(records)
    }
}

pub struct PyprojectUpdater;

impl PyprojectUpdater {
    /// Rewrites the pinned requirement for `name`, returning (old, new) specs.
    fn update_requirement(array: &mut Array, name: &str, latest: &str) -> Option<(String, String, String)> {
        for value in array.iter_mut() {
            let Some(entry) = value.as_str() else {
                continue;
            };
            let Some(caps) = PEP508_PINNED.captures(entry) else {
                continue;
            };
            if !caps[2].eq_ignore_ascii_case(name) {
                continue;
            }
            let old = caps[5].to_string();
            if old == latest || has_template_syntax(&old) {
                return None;
            }

            let declared = caps[2].to_string();
            let rewritten = format!(
                "{}{}{}{}{}{}",
                &caps[1],
                &caps[2],
                caps.get(3).map(|m| m.as_str()).unwrap_or_default(),
                &caps[4],
                latest,
                &caps[6]
            );
            TomlUtils::replace_string(value, &rewritten);
            return Some((declared, format!("=={old}"), format!("=={latest}")));
        }
        None
    }

    fn update_poetry(table: &mut dyn TableLike, name: &str, latest: &str) -> Option<(String, String, String)> {
        let key = table
            .iter()
            .map(|(k, _)| k.to_string())
            .find(|k| k.eq_ignore_ascii_case(name))?;
        let item = table.get_mut(&key)?;
        let old = poetry_spec(item)?;
        first_version_token(&VERSION_TOKEN, &old)?;
        let new = replace_first_version(&VERSION_TOKEN, &old, latest)?;
        if new == old {
            return None;
        }
        TomlUtils::update_version(item, &new).then_some((key, old, new))
    }
}

impl Updater for PyprojectUpdater {
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
            let is_pyproject = r.file_path.rsplit('/').next() == Some(MANIFEST);
            match (&r.section, is_pyproject) {
                (Some(section), true) => Some((section.clone(), r.name.to_lowercase())),
                _ => None,
            }
        });

        for (file, deps) in grouped {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut doc: DocumentMut = match contents.parse() {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "skipping unparseable pyproject.toml");
                    continue;
                }
            };

            let mut by_section: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
            for ((section, _), dep) in &deps {
                if let Some(latest) = dep.latest_version.as_deref() {
                    by_section
                        .entry(section.as_str())
                        .or_default()
                        .push((dep.name.as_str(), latest));
                }
            }
            let mut dirty = false;

            for section in sections(doc.as_table()) {
                let Some(pending) = by_section.get_mut(section.name.as_str()) else {
                    continue;
                };
                pending.sort_unstable();
                let keys = section.keys();

                for (name, latest) in pending.iter() {
                    if actions.len() >= budget {
                        break;
                    }
                    let outcome = match section.shape {
                        Shape::Requirements => requirement_array_mut(doc.as_table_mut(), &keys)
                            .and_then(|array| Self::update_requirement(array, name, latest)),
                        Shape::Poetry => TomlUtils::table_at_mut(doc.as_table_mut(), &keys)
                            .and_then(|table| Self::update_poetry(table, name, latest)),
                    };

                    if let Some((declared, old, new)) = outcome {
                        actions.push(update_action(Ecosystem::Python, &file, &declared, &old, &new, latest));
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
