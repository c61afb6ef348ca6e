//! Maven `pom.xml` `<dependency>` elements.

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

const EXCLUDED_DIRS: &[&str] = &[".git", "target"];
const SECTION: &str = "dependency";

static LITERAL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:\.\d+)*(?:[-+][0-9A-Za-z.-]+)?$").expect("maven version pattern is valid")
});

/// `groupId:artifactId` of a dependency element, when both are present.
fn coordinate(doc: &XmlDocument, dependency: usize) -> Option<String> {
    let group = doc.child_text(dependency, "groupId")?;
    let artifact = doc.child_text(dependency, "artifactId")?;
    Some(format!("{group}:{artifact}"))
}

pub struct MavenPomScanner {
    registry: Arc<dyn RegistryClient>,
}

impl MavenPomScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl Scanner for MavenPomScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, |name| name == "pom.xml")
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let doc = XmlDocument::parse(path, read_for_scan(path)?)?;
        let relative = relative_path(path, root);

        let records = doc
            .elements_named("dependency")
            .filter_map(|dependency| {
                let name = coordinate(&doc, dependency)?;
                let version = doc.child_text(dependency, "version")?;
                Some((name, version))
            })
            .map(|(name, version)| {
                let latest = self.registry.latest_version(&name);
                DependencyRecord::new(Ecosystem::Maven, name, relative.as_str(), version.as_str())
                    .with_resolved(literal_match(&LITERAL_VERSION, &version))
                    .with_latest(latest)
                    .with_section(SECTION)
            })
            .collect();

        Ok(records)
    }
}

pub struct MavenPomUpdater;

impl Updater for MavenPomUpdater {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        for (file, deps) in
            updatable_by_file(records, Ecosystem::Maven, |r| Some(r.name.to_lowercase()))
        {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut doc = match XmlDocument::parse(&path, contents) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "skipping unparseable pom.xml");
                    continue;
                }
            };

            let dependencies: Vec<usize> = doc.elements_named("dependency").collect();
            for dependency in dependencies {
                if actions.len() >= budget {
                    break;
                }
                let Some(name) = coordinate(&doc, dependency) else {
                    continue;
                };
                let Some(latest) = deps
                    .get(&name.to_lowercase())
                    .and_then(|dep| dep.latest_version.as_deref())
                else {
                    continue;
                };
                let Some(version_el) = doc.child(dependency, "version") else {
                    continue;
                };
                let Some(old) = doc.text(version_el) else {
                    continue;
                };
                if old == latest || literal_match(&LITERAL_VERSION, &old).is_none() {
                    continue;
                }

                if doc.set_text(version_el, latest) {
                    actions.push(update_action(Ecosystem::Maven, &file, &name, &old, latest, latest));
                }
            }

            if doc.is_modified() {
                write_manifest(&path, &doc.render())?;
            }
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystems::testing::outdated;
    use crate::error::DepError;
    use crate::registry::testing::StaticRegistry;
    use std::fs;
    use tempfile::tempdir;

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <properties>
    <jackson.version>2.15.0</jackson.version>
  </properties>
  <dependencies>
    <!-- logging -->
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
      <version>2.0.9</version>
    </dependency>
    <dependency>
      <groupId>com.fasterxml.jackson.core</groupId>
      <artifactId>jackson-databind</artifactId>
      <version>${jackson.version}</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>
"#;

    #[test]
    fn property_versions_are_not_resolved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pom.xml");
        fs::write(&path, POM).unwrap();

        let scanner = MavenPomScanner::new(Arc::new(StaticRegistry::new([
            ("org.slf4j:slf4j-api", "2.0.16"),
            ("com.fasterxml.jackson.core:jackson-databind", "2.18.0"),
        ])));
        let records = scanner.scan_file(&path, dir.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].resolved_version.as_deref(), Some("2.0.9"));
        assert!(records[0].update_available());
        assert_eq!(records[1].current_spec, "${jackson.version}");
        assert_eq!(records[1].resolved_version, None);
        assert!(!records[1].update_available());
    }

    #[test]
    fn updates_version_element_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pom.xml");
        fs::write(&path, POM).unwrap();

        let records = vec![outdated(
            Ecosystem::Maven,
            "org.slf4j:slf4j-api",
            "pom.xml",
            Some(SECTION),
            "2.0.9",
            "2.0.16",
        )];

        let actions = MavenPomUpdater.apply_updates(dir.path(), &records, 5).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].new_spec, "2.0.16");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            POM.replace("<version>2.0.9</version>", "<version>2.0.16</version>")
        );

        assert!(MavenPomUpdater.apply_updates(dir.path(), &records, 5).unwrap().is_empty());
    }

    #[test]
    fn malformed_pom_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pom.xml");
        fs::write(&path, "<project><dependencies></project>").unwrap();

        let scanner = MavenPomScanner::new(Arc::new(StaticRegistry::default()));
        let err = scanner.scan_file(&path, dir.path()).unwrap_err();
        assert!(matches!(err, DepError::ManifestParse { .. }));
    }
}
