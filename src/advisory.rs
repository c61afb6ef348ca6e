//! Vulnerability enrichment against the OSV advisory database.

use crate::error::Result;
use crate::model::{DependencyRecord, Ecosystem, Vulnerability};
use crate::registry::{DEFAULT_TIMEOUT, build_http_client, trim_base};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const DEFAULT_OSV: &str = "https://api.osv.dev";
const OSV_SOURCE: &str = "osv";

/// One advisory as returned by the advisory database.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Advisory {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub severity: Vec<Value>,
    #[serde(default)]
    pub references: Vec<AdvisoryReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvisoryReference {
    #[serde(default)]
    pub url: Option<String>,
}

pub trait AdvisorySource {
    /// Advisories affecting `name@version`; empty on any failure.
    fn query(&self, name: &str, ecosystem_id: &str, version: &str) -> Vec<Advisory>;
}

pub struct OsvClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<Advisory>,
}

impl OsvClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_OSV, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

impl AdvisorySource for OsvClient {
    fn query(&self, name: &str, ecosystem_id: &str, version: &str) -> Vec<Advisory> {
        let url = format!("{}/v1/query", self.base_url);
        let payload = json!({
            "package": { "name": name, "ecosystem": ecosystem_id },
            "version": version,
        });

        let response = match self.client.post(&url).json(&payload).send() {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(package = name, version, error = %e, "OSV query failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(package = name, version, status = %response.status(), "OSV returned non-success status");
            return Vec::new();
        }

        match response.json::<OsvResponse>() {
            Ok(body) => body.vulns,
            Err(e) => {
                tracing::warn!(package = name, version, error = %e, "OSV response could not be decoded");
                Vec::new()
            }
        }
    }
}

/// OSV ecosystem identifier for a scanner ecosystem.
pub fn osv_ecosystem(ecosystem: Ecosystem) -> Option<&'static str> {
    match ecosystem {
        Ecosystem::Python => Some("PyPI"),
        Ecosystem::Node => Some("npm"),
        Ecosystem::Go => Some("Go"),
        Ecosystem::Maven => Some("Maven"),
        Ecosystem::Rust => Some("crates.io"),
        Ecosystem::Dotnet => Some("NuGet"),
    }
}

/// Attaches known advisories to every record with a resolved version.
///
/// Records without a resolved version or without an advisory ecosystem are
/// left untouched.
pub fn enrich_vulnerabilities(records: &mut [DependencyRecord], source: &dyn AdvisorySource) {
    for record in records.iter_mut() {
        let Some(ecosystem_id) = osv_ecosystem(record.ecosystem) else {
            continue;
        };
        let Some(resolved) = record.resolved_version.as_deref() else {
            continue;
        };

        let version = if record.ecosystem == Ecosystem::Go {
            resolved.trim_start_matches('v')
        } else {
            resolved
        };

        record.vulnerabilities = source
            .query(&record.name, ecosystem_id, version)
            .into_iter()
            .map(into_vulnerability)
            .collect();

        if !record.vulnerabilities.is_empty() {
            tracing::info!(
                package = %record.name,
                version = resolved,
                count = record.vulnerabilities.len(),
                "known vulnerabilities found"
            );
        }
    }
}

fn into_vulnerability(advisory: Advisory) -> Vulnerability {
    Vulnerability {
        source: OSV_SOURCE.to_string(),
        vuln_id: advisory.id.unwrap_or_else(|| "unknown".to_string()),
        summary: advisory.summary,
        severity: advisory.severity.first().and_then(severity_text),
        reference: advisory.references.into_iter().find_map(|r| r.url),
    }
}

fn severity_text(entry: &Value) -> Option<String> {
    match entry {
        Value::Object(map) => map.get("score").and_then(|score| match score {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }),
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
