//! Per-ecosystem manifest scanners and updaters.
//!
//! Every ecosystem contributes a [`Scanner`] and an [`Updater`] joined by
//! their [`Ecosystem`] tag. [`PluginRegistry`] holds them in a fixed order,
//! which is also the order in which ecosystems consume the update budget.

use crate::error::{DepError, Result};
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::Registries;
use crate::utils::path_validator::PathValidator;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod dotnet_nuget;
pub mod go_mod;
pub mod maven_pom;
pub mod node_package;
pub mod python_pyproject;
pub mod python_requirements;
pub mod rust_cargo;

pub trait Scanner {
    fn ecosystem(&self) -> Ecosystem;

    /// Manifest files under `root`, sorted, skipping excluded directories.
    fn discover_files(&self, root: &Path) -> Vec<PathBuf>;

    /// One record per dependency occurrence declared in `path`.
    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>>;
}

pub trait Updater {
    fn ecosystem(&self) -> Ecosystem;

    /// Rewrites manifests for this ecosystem's updatable records.
    ///
    /// Never returns more than `budget` actions.
    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>>;
}

pub struct EcosystemPlugin {
    pub scanner: Box<dyn Scanner>,
    pub updater: Box<dyn Updater>,
}

impl EcosystemPlugin {
    pub fn new(scanner: impl Scanner + 'static, updater: impl Updater + 'static) -> Self {
        Self {
            scanner: Box::new(scanner),
            updater: Box::new(updater),
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.scanner.ecosystem()
    }
}

pub struct PluginRegistry {
    plugins: Vec<EcosystemPlugin>,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<EcosystemPlugin>) -> Self {
        Self { plugins }
    }

    /// All seven manifest formats, wired to `registries`.
    pub fn standard(registries: &Registries) -> Self {
        use Ecosystem::*;

        Self::new(vec![
            EcosystemPlugin::new(
                go_mod::GoModScanner::new(registries.for_ecosystem(Go)),
                go_mod::GoModUpdater,
            ),
            EcosystemPlugin::new(
                maven_pom::MavenPomScanner::new(registries.for_ecosystem(Maven)),
                maven_pom::MavenPomUpdater,
            ),
            EcosystemPlugin::new(
                rust_cargo::CargoScanner::new(registries.for_ecosystem(Rust)),
                rust_cargo::CargoUpdater,
            ),
            EcosystemPlugin::new(
                dotnet_nuget::NuGetScanner::new(registries.for_ecosystem(Dotnet)),
                dotnet_nuget::NuGetUpdater,
            ),
            EcosystemPlugin::new(
                python_requirements::RequirementsScanner::new(registries.for_ecosystem(Python)),
                python_requirements::RequirementsUpdater,
            ),
            EcosystemPlugin::new(
                python_pyproject::PyprojectScanner::new(registries.for_ecosystem(Python)),
                python_pyproject::PyprojectUpdater,
            ),
            EcosystemPlugin::new(
                node_package::PackageJsonScanner::new(registries.for_ecosystem(Node)),
                node_package::PackageJsonUpdater,
            ),
        ])
    }

    pub fn plugins(&self) -> &[EcosystemPlugin] {
        &self.plugins
    }

    pub fn known_ecosystems(&self) -> BTreeSet<Ecosystem> {
        self.plugins.iter().map(EcosystemPlugin::ecosystem).collect()
    }
}

/// Walks `root` collecting files accepted by `matches`, never descending into
/// a directory named in `excluded`.
pub(crate) fn discover(root: &Path, excluded: &[&str], matches: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !excluded.iter().any(|skip| name == *skip)
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable path during discovery");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matches(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Reads a manifest for scanning; any read failure is a parse failure of that file.
pub(crate) fn read_for_scan(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| DepError::manifest_parse(path, e))
}

/// Resolves `relative` inside `root` and reads it for rewriting.
pub(crate) fn read_manifest(root: &Path, relative: &str) -> Result<(PathBuf, String)> {
    let path = PathValidator::validate_file_path(relative, root)?;
    let contents = fs::read_to_string(&path)?;
    Ok((path, contents))
}

pub(crate) fn write_manifest(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)?;
    tracing::debug!(path = %path.display(), "manifest rewritten");
    Ok(())
}

pub(crate) fn relative_path(path: &Path, root: &Path) -> String {
    PathValidator::relative_display(path, root)
}

/// Updatable records of `ecosystem`, grouped by file in first-seen order and
/// keyed within each file by `key`. Records for which `key` returns `None`
/// are ignored.
pub(crate) fn updatable_by_file<'a, K: Eq + Hash>(
    records: &'a [DependencyRecord],
    ecosystem: Ecosystem,
    key: impl Fn(&DependencyRecord) -> Option<K>,
) -> Vec<(String, HashMap<K, &'a DependencyRecord>)> {
    let mut groups: Vec<(String, HashMap<K, &'a DependencyRecord>)> = Vec::new();

    for record in records {
        if record.ecosystem != ecosystem || !record.update_available() {
            continue;
        }
        let Some(k) = key(record) else {
            continue;
        };

        match groups.iter_mut().find(|(file, _)| *file == record.file_path) {
            Some((_, map)) => {
                map.insert(k, record);
            }
            None => {
                let mut map = HashMap::new();
                map.insert(k, record);
                groups.push((record.file_path.clone(), map));
            }
        }
    }

    groups
}

/// Specifiers carrying interpolation or workspace/protocol syntax are never literal.
pub(crate) fn has_template_syntax(spec: &str) -> bool {
    ["${", "$(", "{{", "workspace:"]
        .iter()
        .any(|marker| spec.contains(marker))
}

/// The whole trimmed specifier if it matches `pattern`.
pub(crate) fn literal_match(pattern: &Regex, spec: &str) -> Option<String> {
    let trimmed = spec.trim();
    if has_template_syntax(trimmed) || !pattern.is_match(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

/// First version token inside `spec` matched by `pattern`.
pub(crate) fn first_version_token(pattern: &Regex, spec: &str) -> Option<String> {
    if has_template_syntax(spec) {
        return None;
    }
    pattern.find(spec).map(|m| m.as_str().to_string())
}

/// Replaces the first version token in `spec` with `latest`, keeping the
/// operator prefix and any trailing text.
pub(crate) fn replace_first_version(pattern: &Regex, spec: &str, latest: &str) -> Option<String> {
    let token = pattern.find(spec)?;
    Some(format!("{}{}{}", &spec[..token.start()], latest, &spec[token.end()..]))
}

/// Splits `contents` into lines, each keeping its own terminator.
pub(crate) fn split_lines(contents: &str) -> Vec<(&str, &str)> {
    contents
        .split_inclusive('\n')
        .map(|line| {
            let body = line.trim_end_matches(['\n', '\r']);
            (body, &line[body.len()..])
        })
        .collect()
}

pub(crate) fn update_action(
    ecosystem: Ecosystem,
    file_path: &str,
    dependency: &str,
    old_spec: &str,
    new_spec: &str,
    latest_version: &str,
) -> UpdateAction {
    UpdateAction {
        ecosystem,
        file_path: file_path.to_string(),
        dependency: dependency.to_string(),
        old_spec: old_spec.to_string(),
        new_spec: new_spec.to_string(),
        latest_version: latest_version.to_string(),
    }
}
