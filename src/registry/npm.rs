use crate::error::Result;
use crate::registry::{RegistryClient, build_http_client, fetch_json, trim_base};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_NPM: &str = "https://registry.npmjs.org";

pub struct NpmClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NpmPackument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
}

impl NpmClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_NPM, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

/// Scoped names keep the `@` but escape the separating slash.
fn encode_package_name(package: &str) -> String {
    package.replace('/', "%2F")
}

impl RegistryClient for NpmClient {
    fn latest_version(&self, package: &str) -> Option<String> {
        let url = format!("{}/{}", self.base_url, encode_package_name(package));
        fetch_json::<NpmPackument>(&self.client, &url, "npm")?
            .dist_tags
            .remove("latest")
    }
}
