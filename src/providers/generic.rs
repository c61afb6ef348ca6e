use super::Provider;
use crate::error::Result;

/// Stand-in used when no PR-capable provider is configured; never touches the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericProvider;

impl Provider for GenericProvider {
    fn open_or_update_pr(
        &self,
        source_branch: &str,
        target_branch: &str,
        _title: &str,
        _body: &str,
        _labels: &[String],
    ) -> Result<Option<String>> {
        tracing::info!(
            source_branch,
            target_branch,
            "generic provider configured; open the pull request manually"
        );
        Ok(None)
    }
}
