use crate::error::Result;
use crate::registry::crates_io::CratesIoClient;
use crate::registry::go_proxy::GoProxyClient;
use crate::registry::maven_central::MavenCentralClient;
use crate::registry::npm::NpmClient;
use crate::registry::nuget::NuGetClient;
use crate::registry::pypi::PyPiClient;
use crate::registry::{DEFAULT_TIMEOUT, Registries};
use std::sync::Arc;
use std::time::Duration;

pub struct RegistryFactory;

impl RegistryFactory {
    /// Public registries with the default request timeout.
    pub fn standard() -> Result<Registries> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Registries> {
        Ok(Registries {
            go: Arc::new(GoProxyClient::new(timeout)?),
            maven: Arc::new(MavenCentralClient::new(timeout)?),
            rust: Arc::new(CratesIoClient::new(timeout)?),
            dotnet: Arc::new(NuGetClient::new(timeout)?),
            python: Arc::new(PyPiClient::new(timeout)?),
            node: Arc::new(NpmClient::new(timeout)?),
        })
    }
}
