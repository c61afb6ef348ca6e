use crate::error::Result;
use crate::registry::{RegistryClient, build_http_client, fetch_json, trim_base};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_GO_PROXY: &str = "https://proxy.golang.org";

pub struct GoProxyClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LatestInfo {
    #[serde(rename = "Version")]
    version: Option<String>,
}

impl GoProxyClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_GO_PROXY, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

/// Module proxy paths encode upper-case letters as `!` + lower-case.
fn escape_module_path(module: &str) -> String {
    let mut escaped = String::with_capacity(module.len());
    for ch in module.chars() {
        if ch.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(ch.to_ascii_lowercase());
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

impl RegistryClient for GoProxyClient {
    fn latest_version(&self, package: &str) -> Option<String> {
        let url = format!("{}/{}/@latest", self.base_url, escape_module_path(package));
        fetch_json::<LatestInfo>(&self.client, &url, "go")?.version
    }
}
