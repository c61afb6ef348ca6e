//! `go.mod` require directives.

use crate::ecosystems::{
    Scanner, Updater, discover, literal_match, read_for_scan, read_manifest, relative_path,
    split_lines, update_action, updatable_by_file, write_manifest,
};
use crate::error::Result;
use crate::model::{DependencyRecord, Ecosystem, UpdateAction};
use crate::registry::RegistryClient;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

const EXCLUDED_DIRS: &[&str] = &[".git", "vendor"];
const SECTION: &str = "require";

static LITERAL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.-]+)?$").expect("go version pattern is valid")
});
static BLOCK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*require\s*\(\s*$").expect("require block pattern is valid"));
static SINGLE_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*require\s+)(\S+)(\s+)(\S+)(.*)$").expect("require pattern is valid")
});
static BLOCK_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(\S+)(\s+)(\S+)(.*)$").expect("require entry pattern is valid"));

/// A `module version` pair on one line, with the text around the version kept verbatim.
struct RequireLine<'a> {
    head: &'a str,
    module: &'a str,
    version: &'a str,
    tail: &'a str,
}

/// Tracks whether the cursor is inside a `require ( ... )` block.
#[derive(Default)]
struct RequireCursor {
    in_block: bool,
}

impl RequireCursor {
    fn advance<'a>(&mut self, line: &'a str) -> Option<RequireLine<'a>> {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with("//") {
            return None;
        }
        if BLOCK_START.is_match(line) {
            self.in_block = true;
            return None;
        }
        if self.in_block && stripped == ")" {
            self.in_block = false;
            return None;
        }

        let pattern = if self.in_block { &*BLOCK_ENTRY } else { &*SINGLE_REQUIRE };
        let caps = pattern.captures(line)?;
        let version = caps.get(4)?;
        Some(RequireLine {
            head: &line[..version.start()],
            module: caps.get(2)?.as_str(),
            version: version.as_str(),
            tail: &line[version.end()..],
        })
    }
}

pub struct GoModScanner {
    registry: Arc<dyn RegistryClient>,
}

impl GoModScanner {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

impl Scanner for GoModScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        discover(root, EXCLUDED_DIRS, |name| name == "go.mod")
    }

    fn scan_file(&self, path: &Path, root: &Path) -> Result<Vec<DependencyRecord>> {
        let contents = read_for_scan(path)?;
        let relative = relative_path(path, root);
        let mut cursor = RequireCursor::default();

        let records = contents
            .lines()
            .filter_map(|line| cursor.advance(line))
            .map(|entry| {
                DependencyRecord::new(Ecosystem::Go, entry.module, relative.as_str(), entry.version)
                    .with_resolved(literal_match(&LITERAL_VERSION, entry.version))
                    .with_latest(self.registry.latest_version(entry.module))
                    .with_section(SECTION)
            })
            .collect();

        Ok(records)
    }
}

pub struct GoModUpdater;

impl Updater for GoModUpdater {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn apply_updates(
        &self,
        root: &Path,
        records: &[DependencyRecord],
        budget: usize,
    ) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        // Go module paths are case-sensitive.
        for (file, deps) in updatable_by_file(records, Ecosystem::Go, |r| Some(r.name.clone())) {
            if actions.len() >= budget {
                break;
            }

            let (path, contents) = read_manifest(root, &file)?;
            let mut cursor = RequireCursor::default();
            let mut output = String::with_capacity(contents.len());
            let mut dirty = false;

            for (line, terminator) in split_lines(&contents) {
                let entry = cursor.advance(line);
                let target = entry.as_ref().and_then(|e| {
                    let dep = deps.get(e.module)?;
                    let latest = dep.latest_version.as_deref()?;
                    let literal = literal_match(&LITERAL_VERSION, e.version).is_some();
                    (literal && e.version != latest && actions.len() < budget).then_some(latest)
                });

                match (entry, target) {
                    (Some(e), Some(latest)) => {
                        output.push_str(e.head);
                        output.push_str(latest);
                        output.push_str(e.tail);
                        actions.push(update_action(Ecosystem::Go, &file, e.module, e.version, latest, latest));
                        dirty = true;
                    }
                    _ => output.push_str(line),
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
