use crate::error::Result;
use crate::registry::{RegistryClient, build_http_client, fetch_json, trim_base};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_PYPI: &str = "https://pypi.org";

pub struct PyPiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PyPiProject {
    info: PyPiInfo,
}

#[derive(Debug, Deserialize)]
struct PyPiInfo {
    version: Option<String>,
}

impl PyPiClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_PYPI, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

impl RegistryClient for PyPiClient {
    fn latest_version(&self, package: &str) -> Option<String> {
        let url = format!("{}/pypi/{}/json", self.base_url, package);
        fetch_json::<PyPiProject>(&self.client, &url, "pypi")?.info.version
    }
}
