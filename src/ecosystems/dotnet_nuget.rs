//! NuGet references in MSBuild project files and `packages.config`.

use crate::ecosystems::{
    Scanner, Updater, discover, literal_match, read_for_scan, read_manifest, relative_path,
    update_action, updatable_by_file, write_manifest,
};
use crate::error::Result;
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::RegistryClient;
use crate::utils::xml::XmlDocument;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

const EXCLUDED_DIRS: &[&str] = &[".git", "bin", "obj"];
const PROJECT_SUFFIXES: &[&str] = &[".csproj", ".fsproj", ".vbproj", ".props", ".targets"];
const REFERENCE_ELEMENTS: &[&str] = &["PackageReference", "PackageVersion"];
const PACKAGES_CONFIG: &str = "packages.config";

static LITERAL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:\.\d+)?(?:[-+][0-9A-Za-z.-]+)?$")
        .expect("nuget version pattern is valid")
});

fn is_packages_config(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().eq_ignore_ascii_case(PACKAGES_CONFIG))
        .unwrap_or(false)
}

/// Where a package's version lives inside the document.
enum VersionSlot {
    Attribute(usize, &'static str),
    Element(usize),
}

/// One package reference: (section, package id, version slot, current spec).
struct PackageRef {
    section: &'static str,
    name: String,
    slot: VersionSlot,
    spec: String,
}

fn package_refs(doc: &XmlDocument, packages_config: bool) -> Vec<PackageRef> {
    if packages_config {
        return doc
            .elements_named("package")
            .filter_map(|idx| {
                Some(PackageRef {
                    section: PACKAGES_CONFIG,
                    name: doc.attribute(idx, "id").filter(|id| !id.is_empty())?,
                    spec: doc.attribute(idx, "version").filter(|v| !v.is_empty())?,
                    slot: VersionSlot::Attribute(idx, "version"),
                })
            })
            .collect();
    }

    let mut refs = Vec::new();
    for &section in REFERENCE_ELEMENTS {
        for idx in doc.elements_named(section) {
            let Some(name) = doc
                .attribute(idx, "Include")
                .or_else(|| doc.attribute(idx, "Update"))
                .filter(|n| !n.is_empty())
            else {
                continue;
            };

            let attribute = doc.attribute(idx, "Version").filter(|v| !v.is_empty());
            let (slot, spec) = match attribute {
                Some(spec) => (VersionSlot::Attribute(idx, "Version"), spec),
                None => {
                    let Some(child) = doc.child(idx, "Version") else {
                        continue;
                    };
                    let Some(spec) = doc.text(child) else {
                        continue;
                    };
                    (VersionSlot::Element(child), spec)
                }
            };

            refs.push(PackageRef {
                section,
                name,
                slot,
                spec,
            });
        }
    }
    // Keep document order across both element kinds.
    refs.sort_by_key(|r| match r.slot {
        VersionSlot::Attribute(idx, _) => idx,
        VersionSlot::Element(child) => doc.element(child).parent.unwrap_or(child),
    });
    refs
}

pub struct NuGetScanner {
    registry: Arc<dyn RegistryClient>,
}

impl NuGetScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl Scanner for NuGetScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Dotnet
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, |name| {
            let lowered = name.to_ascii_lowercase();
            PROJECT_SUFFIXES.iter().any(|suffix| lowered.ends_with(suffix))
                || lowered == "directory.packages.props"
                || lowered == PACKAGES_CONFIG
        })
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let doc = XmlDocument::parse(path, read_for_scan(path)?)?;
        let relative = relative_path(path, root);

        let records = package_refs(&doc, is_packages_config(path))
            .into_iter()
            .map(|package| {
                let latest = self.registry.latest_version(&package.name);
                DependencyRecord::new(Ecosystem::Dotnet, package.name, relative.as_str(), package.spec.as_str())
                    .with_resolved(literal_match(&LITERAL_VERSION, &package.spec))
                    .with_latest(latest)
                    .with_section(package.section)
            })
            .collect();

        Ok(records)
    }
}

pub struct NuGetUpdater;

impl Updater for NuGetUpdater {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Dotnet
    }

    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        let grouped = updatable_by_file(records, Ecosystem::Dotnet, |r| {
            r.section.clone().map(|s| (s, r.name.to_lowercase()))
        });

        for (file, deps) in grouped {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut doc = match XmlDocument::parse(&path, contents) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "skipping unparseable NuGet manifest");
                    continue;
                }
            };

            for package in package_refs(&doc, is_packages_config(&path)) {
                if actions.len() >= budget {
                    break;
                }
                let key = (package.section.to_string(), package.name.to_lowercase());
                let Some(latest) = deps.get(&key).and_then(|dep| dep.latest_version.as_deref())
                else {
                    continue;
                };
                if package.spec == latest || literal_match(&LITERAL_VERSION, &package.spec).is_none() {
                    continue;
                }

                let written = match package.slot {
                    VersionSlot::Attribute(idx, attr) => doc.set_attribute(idx, attr, latest),
                    VersionSlot::Element(idx) => doc.set_text(idx, latest),
                };
                if written {
                    actions.push(update_action(
                        Ecosystem::Dotnet,
                        &file,
                        &package.name,
                        &package.spec,
                        latest,
                        latest,
                    ));
                }
            }

            if doc.is_modified() {
                write_manifest(&path, &doc.render())?;
            }
        }

        Ok(actions)
    }
}
