use crate::error::Result;
use crate::registry::{RegistryClient, build_http_client, fetch_json, trim_base};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CRATES_IO: &str = "https://crates.io";

pub struct CratesIoClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    max_stable_version: Option<String>,
    newest_version: Option<String>,
}

impl CratesIoClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_CRATES_IO, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

impl RegistryClient for CratesIoClient {
    fn latest_version(&self, package: &str) -> Option<String> {
        let url = format!("{}/api/v1/crates/{}", self.base_url, package);
        let info = fetch_json::<CrateResponse>(&self.client, &url, "crates.io")?.krate;
        info.max_stable_version.or(info.newest_version)
    }
}
