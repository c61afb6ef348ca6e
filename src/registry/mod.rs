//! Package registry lookups, one client per ecosystem.
//!
//! Every client honours the same contract: a failed or timed-out request,
//! a non-success status or an undecodable body all degrade to `None`.

use crate::error::{DepError, Result};
use crate::model::Ecosystem;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub mod crates_io;
pub mod factory;
pub mod go_proxy;
pub mod maven_central;
pub mod npm;
pub mod nuget;
pub mod pypi;
pub mod version;

pub use factory::RegistryFactory;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = concat!("depdetective/", env!("CARGO_PKG_VERSION"));

pub trait RegistryClient: Send + Sync {
    /// Latest published version of `package`, or `None` when unknown.
    fn latest_version(&self, package: &str) -> Option<String>;
}

/// One registry client per ecosystem.
#[derive(Clone)]
pub struct Registries {
    pub go: Arc<dyn RegistryClient>,
    pub maven: Arc<dyn RegistryClient>,
    pub rust: Arc<dyn RegistryClient>,
    pub dotnet: Arc<dyn RegistryClient>,
    pub python: Arc<dyn RegistryClient>,
    pub node: Arc<dyn RegistryClient>,
}

impl Registries {
    /// Routes every ecosystem to the same client.
    #[cfg(test)]
    pub fn uniform(client: Arc<dyn RegistryClient>) -> Self {
        Self {
            go: Arc::clone(&client),
            maven: Arc::clone(&client),
            rust: Arc::clone(&client),
            dotnet: Arc::clone(&client),
            python: Arc::clone(&client),
            node: client,
        }
    }

    pub fn for_ecosystem(&self, ecosystem: Ecosystem) -> Arc<dyn RegistryClient> {
        let client = match ecosystem {
            Ecosystem::Go => &self.go,
            Ecosystem::Maven => &self.maven,
            Ecosystem::Rust => &self.rust,
            Ecosystem::Dotnet => &self.dotnet,
            Ecosystem::Python => &self.python,
            Ecosystem::Node => &self.node,
        };
        Arc::clone(client)
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(DepError::from)
}

/// GET `url` and decode a JSON body, logging and swallowing every failure.
pub(crate) fn fetch_json<T: DeserializeOwned>(client: &Client, url: &str, registry: &str) -> Option<T> {
    tracing::debug!(registry, url, "registry lookup");

    let response = match client.get(url).send() {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(registry, url, error = %e, "registry request failed");
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::debug!(registry, url, status = %response.status(), "registry returned non-success status");
        return None;
    }

    match response.json::<T>() {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(registry, url, error = %e, "registry response could not be decoded");
            None
        }
    }
}

pub(crate) fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
