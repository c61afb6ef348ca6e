//! Pull/merge request reconciliation against remote code-hosting systems.
//!
//! Every provider answers one question: is there already an open request for
//! this (source, target) branch pair? If so it is refreshed in place,
//! otherwise a new one is opened. Either way the web URL comes back.

use crate::error::{DepError, Result};
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

pub mod azure_devops;
pub mod generic;
pub mod github;
pub mod gitlab;

pub use azure_devops::AzureDevOpsProvider;
pub use generic::GenericProvider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("depdetective/", env!("CARGO_PKG_VERSION"));

pub trait Provider {
    /// Opens a request for `source_branch` into `target_branch`, or refreshes
    /// the first open one for that pair. Returns its web URL when known.
    fn open_or_update_pr(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    GitHub,
    GitLab,
    AzureDevOps,
    #[default]
    Generic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::AzureDevOps => "azure_devops",
            ProviderKind::Generic => "generic",
        }
    }

    /// Environment variable holding the API token when none is configured.
    pub fn default_token_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::GitHub => Some("GITHUB_TOKEN"),
            ProviderKind::GitLab => Some("GITLAB_TOKEN"),
            ProviderKind::AzureDevOps => Some("AZURE_DEVOPS_TOKEN"),
            ProviderKind::Generic => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            "azure_devops" | "ado" | "azure" => Ok(ProviderKind::AzureDevOps),
            "generic" => Ok(ProviderKind::Generic),
            other => Err(DepError::Config(format!(
                "Unknown provider type '{other}' (expected github, gitlab, azure_devops or generic)"
            ))),
        }
    }
}

/// Settings needed to construct a provider once it is actually required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub repo: Option<String>,
    pub token_env: Option<String>,
    pub host: Option<String>,
}

/// Builds the provider for `settings`, reading its token from the environment.
///
/// The repository slug comes from `settings.repo` or is inferred from
/// `repo_url`. PR-capable providers without a slug or a token are rejected.
pub fn build_provider(settings: &ProviderSettings, repo_url: &str) -> Result<Box<dyn Provider>> {
    let kind = settings.kind;
    if kind == ProviderKind::Generic {
        return Ok(Box::new(GenericProvider));
    }

    let slug = settings
        .repo
        .clone()
        .filter(|repo| !repo.trim().is_empty())
        .or_else(|| infer_repo_slug(repo_url, kind))
        .ok_or_else(|| {
            DepError::Config(format!("provider.repo is required for the {kind} provider"))
        })?;

    let token_env = settings
        .token_env
        .clone()
        .or_else(|| kind.default_token_env().map(str::to_string))
        .unwrap_or_default();
    let host = settings.host.as_deref();

    match kind {
        ProviderKind::GitHub => {
            let token = read_token(&token_env)?;
            Ok(Box::new(GitHubProvider::new(slug, token, host)?))
        }
        ProviderKind::GitLab => {
            let token = read_token(&token_env)?;
            Ok(Box::new(GitLabProvider::new(slug, token, host)?))
        }
        ProviderKind::AzureDevOps => {
            let token = azure_devops::read_token(&token_env)?;
            Ok(Box::new(AzureDevOpsProvider::new(&slug, token, host)?))
        }
        ProviderKind::Generic => Ok(Box::new(GenericProvider)),
    }
}

pub(crate) fn read_token(token_env: &str) -> Result<String> {
    env::var(token_env)
        .ok()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| DepError::Config(format!("Missing token in env var: {token_env}")))
}

static HTTP_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/]+/(.+?)(?:\.git)?/?$").expect("http slug pattern is valid")
});
static SCP_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^git@[^:]+:(.+?)(?:\.git)?$").expect("scp slug pattern is valid"));
static SSH_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ssh://git@[^/]+/(.+?)(?:\.git)?/?$").expect("ssh slug pattern is valid")
});
static AZURE_HTTP_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/]+/([^/]+)/([^/]+)/_git/([^/]+?)(?:\.git)?/?$")
        .expect("azure http slug pattern is valid")
});
static AZURE_SSH_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ssh://git@[^:]+:v3/([^/]+)/([^/]+)/([^/]+?)(?:\.git)?/?$")
        .expect("azure ssh slug pattern is valid")
});

/// Derives the provider's repository identifier from a clone URL.
///
/// Azure DevOps yields `org/project/repo`, GitHub `owner/repo`, and GitLab
/// keeps the full nested group path.
pub fn infer_repo_slug(repo_url: &str, kind: ProviderKind) -> Option<String> {
    let repo_url = repo_url.trim();
    if repo_url.is_empty() {
        return None;
    }

    if kind == ProviderKind::AzureDevOps {
        return [&*AZURE_HTTP_SLUG, &*AZURE_SSH_SLUG]
            .into_iter()
            .find_map(|re| re.captures(repo_url))
            .map(|caps| format!("{}/{}/{}", &caps[1], &caps[2], &caps[3]));
    }

    let path = [&*HTTP_SLUG, &*SCP_SLUG, &*SSH_SLUG]
        .into_iter()
        .find_map(|re| re.captures(repo_url))
        .map(|caps| caps[1].trim_matches('/').to_string())?;
    if path.is_empty() {
        return None;
    }

    if kind == ProviderKind::GitHub {
        let parts: Vec<&str> = path.split('/').collect();
        return (parts.len() >= 2).then(|| parts[..2].join("/"));
    }
    Some(path)
}

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(DepError::from)
}

pub(crate) fn trim_host(host: Option<&str>, default: &str) -> String {
    host.unwrap_or(default).trim_end_matches('/').to_string()
}

/// Percent-encodes one path segment, `/` included.
pub(crate) fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Sends `request`, turning transport failures and non-success statuses into
/// [`DepError::Provider`].
pub(crate) fn send_checked(request: RequestBuilder, action: &str) -> Result<Response> {
    let response = request
        .send()
        .map_err(|e| DepError::Provider(format!("{action} failed: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(DepError::Provider(format!(
        "{action} failed with status {status}: {}",
        body.trim()
    )))
}

pub(crate) fn send_json<T: DeserializeOwned>(request: RequestBuilder, action: &str) -> Result<T> {
    send_checked(request, action)?
        .json::<T>()
        .map_err(|e| DepError::Provider(format!("{action} returned an unreadable body: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_kinds_and_aliases() {
        assert_eq!("GitHub".parse::<ProviderKind>().unwrap(), ProviderKind::GitHub);
        assert_eq!("ado".parse::<ProviderKind>().unwrap(), ProviderKind::AzureDevOps);
        assert_eq!("azure".parse::<ProviderKind>().unwrap(), ProviderKind::AzureDevOps);
        assert!(matches!(
            "bitbucket".parse::<ProviderKind>(),
            Err(DepError::Config(_))
        ));
    }

    #[test]
    fn infers_github_slugs() {
        assert_eq!(
            infer_repo_slug("https://github.com/org/repo.git", ProviderKind::GitHub).as_deref(),
            Some("org/repo")
        );
        assert_eq!(
            infer_repo_slug("git@github.com:org/repo.git", ProviderKind::GitHub).as_deref(),
            Some("org/repo")
        );
        assert_eq!(
            infer_repo_slug("ssh://git@github.com/org/repo/", ProviderKind::GitHub).as_deref(),
            Some("org/repo")
        );
        assert_eq!(infer_repo_slug("https://github.com/org", ProviderKind::GitHub), None);
    }

    #[test]
    fn keeps_nested_gitlab_groups() {
        assert_eq!(
            infer_repo_slug("https://gitlab.com/group/subgroup/repo.git", ProviderKind::GitLab)
                .as_deref(),
            Some("group/subgroup/repo")
        );
    }

    #[test]
    fn infers_azure_devops_triples() {
        assert_eq!(
            infer_repo_slug("https://dev.azure.com/org/project/_git/repo", ProviderKind::AzureDevOps)
                .as_deref(),
            Some("org/project/repo")
        );
        assert_eq!(
            infer_repo_slug(
                "ssh://git@ssh.dev.azure.com:v3/org/project/repo",
                ProviderKind::AzureDevOps
            )
            .as_deref(),
            Some("org/project/repo")
        );
        assert_eq!(
            infer_repo_slug("https://github.com/org/repo.git", ProviderKind::AzureDevOps),
            None
        );
    }

    #[test]
    fn generic_provider_needs_nothing() {
        let provider = build_provider(&ProviderSettings::default(), "").unwrap();
        let url = provider
            .open_or_update_pr("depdetective/autoupdate", "main", "t", "b", &[])
            .unwrap();
        assert_eq!(url, None);
    }

    #[test]
    fn missing_slug_or_token_is_a_config_error() {
        let no_slug = ProviderSettings {
            kind: ProviderKind::GitHub,
            ..ProviderSettings::default()
        };
        let err = build_provider(&no_slug, "file:///tmp/origin.git").err().unwrap();
        assert!(matches!(err, DepError::Config(ref m) if m.contains("provider.repo")));

        let no_token = ProviderSettings {
            kind: ProviderKind::GitLab,
            repo: Some("group/repo".to_string()),
            token_env: Some("DEPDETECTIVE_TEST_TOKEN_THAT_IS_NEVER_SET".to_string()),
            host: None,
        };
        let err = build_provider(&no_token, "").err().unwrap();
        assert!(
            matches!(err, DepError::Config(ref m) if m.contains("DEPDETECTIVE_TEST_TOKEN_THAT_IS_NEVER_SET"))
        );
    }

    #[test]
    fn encodes_path_segments() {
        assert_eq!(encode_segment("group/sub repo"), "group%2Fsub%20repo");
    }
}
