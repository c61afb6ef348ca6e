use crate::error::Result;
use crate::registry::version::pick_latest;
use crate::registry::{RegistryClient, build_http_client, trim_base};
use quick_xml::de::from_str;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";
const MAX_METADATA_BYTES: usize = 10 * 1024 * 1024;

/// Maven repository client reading `maven-metadata.xml`.
///
/// Packages are addressed as `groupId:artifactId`.
pub struct MavenCentralClient {
    client: Client,
    base_url: String,
}

impl MavenCentralClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_MAVEN_CENTRAL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }

    fn metadata_url(&self, group: &str, artifact: &str) -> String {
        format!(
            "{}/{}/{}/maven-metadata.xml",
            self.base_url,
            group.replace('.', "/"),
            artifact
        )
    }

    fn fetch_metadata(&self, group: &str, artifact: &str) -> Option<MavenMetadata> {
        let url = self.metadata_url(group, artifact);
        tracing::debug!(registry = "maven", url = %url, "registry lookup");

        let response = match self.client.get(&url).send() {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(registry = "maven", url = %url, error = %e, "registry request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(registry = "maven", url = %url, status = %response.status(), "registry returned non-success status");
            return None;
        }

        let text = response.text().ok()?;
        if text.len() > MAX_METADATA_BYTES {
            tracing::warn!(registry = "maven", url = %url, "maven metadata exceeded 10MB limit");
            return None;
        }

        match from_str::<MavenMetadata>(&text) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(registry = "maven", url = %url, error = %e, "failed to parse maven metadata");
                None
            }
        }
    }
}

impl RegistryClient for MavenCentralClient {
    fn latest_version(&self, package: &str) -> Option<String> {
        let (group, artifact) = package.split_once(':')?;
        let versioning = self.fetch_metadata(group, artifact)?.versioning?;

        if let Some(release) = versioning.release.filter(|r| !r.trim().is_empty()) {
            return Some(release.trim().to_string());
        }

        let versions = versioning.versions.map(|v| v.version).unwrap_or_default();
        pick_latest(&versions)
    }
}

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: Option<Versioning>,
}

#[derive(Debug, Deserialize)]
struct Versioning {
    release: Option<String>,
    versions: Option<Versions>,
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(default)]
    version: Vec<String>,
}
