use crate::error::Result;
use crate::registry::{RegistryClient, build_http_client, fetch_json, trim_base};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_NUGET_FLAT_CONTAINER: &str = "https://api.nuget.org/v3-flatcontainer";

pub struct NuGetClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FlatContainerIndex {
    #[serde(default)]
    versions: Vec<String>,
}

impl NuGetClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_NUGET_FLAT_CONTAINER, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

impl RegistryClient for NuGetClient {
    fn latest_version(&self, package: &str) -> Option<String> {
        let url = format!(
            "{}/{}/index.json",
            self.base_url,
            package.to_ascii_lowercase()
        );
        let index = fetch_json::<FlatContainerIndex>(&self.client, &url, "nuget")?;

        // The flat container lists versions in ascending order.
        index
            .versions
            .iter()
            .rev()
            .find(|v| !v.contains('-'))
            .or_else(|| index.versions.last())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_last_stable_version() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/newtonsoft.json/index.json")
            .with_status(200)
            .with_body(r#"{"versions":["13.0.1","13.0.3","14.0.0-beta1"]}"#)
            .create();

        let client = NuGetClient::with_base_url(server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.latest_version("Newtonsoft.Json").as_deref(),
            Some("13.0.3")
        );
    }

    #[test]
    fn empty_index_is_unknown() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/serilog/index.json")
            .with_status(200)
            .with_body(r#"{"versions":[]}"#)
            .create();

        let client = NuGetClient::with_base_url(server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(client.latest_version("Serilog"), None);
    }
}
