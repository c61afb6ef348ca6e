use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Package-management universe handled by one scanner/updater pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ecosystem {
    Go,
    Maven,
    Rust,
    Dotnet,
    Python,
    Node,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 6] = [
        Ecosystem::Go,
        Ecosystem::Maven,
        Ecosystem::Rust,
        Ecosystem::Dotnet,
        Ecosystem::Python,
        Ecosystem::Node,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Go => "go",
            Ecosystem::Maven => "maven",
            Ecosystem::Rust => "rust",
            Ecosystem::Dotnet => "dotnet",
            Ecosystem::Python => "python",
            Ecosystem::Node => "node",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Ecosystem::ALL
            .into_iter()
            .find(|eco| eco.as_str() == lowered)
            .ok_or_else(|| format!("unknown ecosystem '{s}'"))
    }
}

impl Serialize for Ecosystem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Known advisory attached to a scanned dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vulnerability {
    pub source: String,
    #[serde(rename = "id")]
    pub vuln_id: String,
    pub summary: Option<String>,
    pub severity: Option<String>,
    pub reference: Option<String>,
}

/// One declared dependency occurrence inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub ecosystem: Ecosystem,
    pub name: String,
    /// Path relative to the repository root, `/`-separated.
    pub file_path: String,
    pub current_spec: String,
    /// Only set when `current_spec` is an unambiguous literal version.
    pub resolved_version: Option<String>,
    pub latest_version: Option<String>,
    /// Manifest subsection that produced the record; disambiguates repeated names.
    pub section: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl DependencyRecord {
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        file_path: impl Into<String>,
        current_spec: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem,
            name: name.into(),
            file_path: file_path.into(),
            current_spec: current_spec.into(),
            resolved_version: None,
            latest_version: None,
            section: None,
            vulnerabilities: Vec::new(),
        }
    }

    pub fn with_resolved(mut self, resolved: Option<String>) -> Self {
        self.resolved_version = resolved;
        self
    }

    pub fn with_latest(mut self, latest: Option<String>) -> Self {
        self.latest_version = latest;
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn update_available(&self) -> bool {
        match (&self.resolved_version, &self.latest_version) {
            (Some(resolved), Some(latest)) => resolved != latest,
            _ => false,
        }
    }
}

impl Serialize for DependencyRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("DependencyRecord", 8)?;
        state.serialize_field("ecosystem", &self.ecosystem)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("file_path", &self.file_path)?;
        state.serialize_field("current_spec", &self.current_spec)?;
        state.serialize_field("resolved_version", &self.resolved_version)?;
        state.serialize_field("latest_version", &self.latest_version)?;
        state.serialize_field("update_available", &self.update_available())?;
        state.serialize_field("vulnerabilities", &self.vulnerabilities)?;
        state.end()
    }
}

/// One in-place manifest edit performed by an updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateAction {
    pub ecosystem: Ecosystem,
    pub file_path: String,
    pub dependency: String,
    pub old_spec: String,
    pub new_spec: String,
    pub latest_version: String,
}

/// Everything a single run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub scanned_dependencies: Vec<DependencyRecord>,
    pub updates_applied: Vec<UpdateAction>,
    pub provider_pr_url: Option<String>,
    pub pr_workflow_triggered: bool,
}

impl RunReport {
    pub fn new(scanned_dependencies: Vec<DependencyRecord>) -> Self {
        Self {
            scanned_dependencies,
            ..Self::default()
        }
    }

    pub fn vulnerabilities_count(&self) -> usize {
        self.scanned_dependencies
            .iter()
            .map(|dep| dep.vulnerabilities.len())
            .sum()
    }
}
