use super::{Provider, encode_segment, http_client, send_json, trim_host};
use crate::error::{DepError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::env;

const DEFAULT_HOST: &str = "https://dev.azure.com";
const API_VERSION: &str = "7.1";
const PIPELINE_TOKEN_ENV: &str = "SYSTEM_ACCESSTOKEN";

/// How the token is presented to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AzureToken {
    /// Personal access token, sent as basic auth with an empty user.
    Personal(String),
    /// Pipeline-injected `SYSTEM_*` token, sent as a bearer token.
    Pipeline(String),
}

impl AzureToken {
    pub fn secret(&self) -> &str {
        match self {
            AzureToken::Personal(token) | AzureToken::Pipeline(token) => token,
        }
    }

    fn from_env_value(token_env: &str, value: String) -> Self {
        if token_env.to_ascii_uppercase().starts_with("SYSTEM_") {
            AzureToken::Pipeline(value)
        } else {
            AzureToken::Personal(value)
        }
    }
}

/// Reads `token_env`, falling back to the pipeline's `SYSTEM_ACCESSTOKEN`.
pub(crate) fn read_token(token_env: &str) -> Result<AzureToken> {
    let lookup = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());

    if let Some(value) = lookup(token_env) {
        return Ok(AzureToken::from_env_value(token_env, value));
    }
    lookup(PIPELINE_TOKEN_ENV)
        .map(|value| AzureToken::from_env_value(PIPELINE_TOKEN_ENV, value))
        .ok_or_else(|| DepError::Config(format!("Missing token in env var: {token_env}")))
}

#[derive(Debug, Deserialize)]
struct PullRequestList {
    #[serde(default)]
    value: Vec<PullRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    pull_request_id: Option<u64>,
    url: Option<String>,
    #[serde(rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    web: Option<Link>,
}

#[derive(Debug, Default, Deserialize)]
struct Link {
    href: Option<String>,
}

impl PullRequest {
    /// Web link from `_links`, else the API url rewritten to its web form.
    fn web_url(&self) -> Option<String> {
        let href = self
            .links
            .as_ref()
            .and_then(|links| links.web.as_ref())
            .and_then(|web| web.href.clone())
            .filter(|href| !href.is_empty());
        if href.is_some() {
            return href;
        }

        self.url
            .as_deref()
            .filter(|url| url.contains("/_apis/"))
            .map(|url| {
                url.replace("/_apis/git/repositories", "/_git")
                    .replace("/pullrequests", "/pullrequest")
            })
    }
}

/// Azure DevOps Repos pull requests, addressed as `org/project/repo`.
pub struct AzureDevOpsProvider {
    client: Client,
    token: AzureToken,
    host: String,
    organization: String,
    project: String,
    repository: String,
}

impl AzureDevOpsProvider {
    pub fn new(repo: &str, token: AzureToken, host: Option<&str>) -> Result<Self> {
        let parts: Vec<&str> = repo.split('/').filter(|part| !part.is_empty()).collect();
        let [organization, project, repository] = parts.as_slice() else {
            return Err(DepError::Config(
                "Azure DevOps provider repo must be '<org>/<project>/<repo>'".to_string(),
            ));
        };

        Ok(Self {
            client: http_client()?,
            token,
            host: trim_host(host, DEFAULT_HOST),
            organization: organization.to_string(),
            project: project.to_string(),
            repository: repository.to_string(),
        })
    }

    fn pull_requests_url(&self) -> String {
        format!(
            "{}/{}/{}/_apis/git/repositories/{}/pullrequests",
            self.host,
            self.organization,
            self.project,
            encode_segment(&self.repository)
        )
    }

    fn fallback_web_url(&self, id: u64) -> String {
        format!(
            "{}/{}/{}/_git/{}/pullrequest/{id}",
            self.host,
            self.organization,
            self.project,
            encode_segment(&self.repository)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.token {
            AzureToken::Personal(token) => request.basic_auth("", Some(token)),
            AzureToken::Pipeline(token) => request.bearer_auth(token),
        };
        request.query(&[("api-version", API_VERSION)])
    }

    fn resolve_url(&self, pr: &PullRequest) -> Option<String> {
        pr.web_url()
            .or_else(|| pr.pull_request_id.map(|id| self.fallback_web_url(id)))
    }
}

fn as_ref_name(branch: &str) -> String {
    if branch.starts_with("refs/heads/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

/// Azure Repos has no label call in this flow, so labels ride along in the text.
fn description_with_labels(body: &str, labels: &[String]) -> String {
    if labels.is_empty() {
        return body.to_string();
    }
    let suffix = format!("Labels: {}", labels.join(", "));
    if body.contains(&suffix) {
        body.to_string()
    } else {
        format!("{body}\n\n{suffix}")
    }
}

impl Provider for AzureDevOpsProvider {
    fn open_or_update_pr(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Option<String>> {
        let source_ref = as_ref_name(source_branch);
        let target_ref = as_ref_name(target_branch);
        let description = description_with_labels(body, labels);

        let lookup = self.client.get(self.pull_requests_url()).query(&[
            ("searchCriteria.status", "active"),
            ("searchCriteria.sourceRefName", source_ref.as_str()),
            ("searchCriteria.targetRefName", target_ref.as_str()),
        ]);
        let existing: PullRequestList =
            send_json(self.authorized(lookup), "Azure DevOps pull request lookup")?;

        if let Some(id) = existing.value.first().and_then(|pr| pr.pull_request_id) {
            tracing::info!(id, "updating existing Azure DevOps pull request");
            let request = self
                .client
                .patch(format!("{}/{id}", self.pull_requests_url()))
                .json(&json!({ "title": title, "description": description }));
            let updated: PullRequest =
                send_json(self.authorized(request), "Azure DevOps pull request update")?;
            return Ok(updated.web_url().or_else(|| Some(self.fallback_web_url(id))));
        }

        let request = self.client.post(self.pull_requests_url()).json(&json!({
            "sourceRefName": source_ref,
            "targetRefName": target_ref,
            "title": title,
            "description": description,
        }));
        let created: PullRequest =
            send_json(self.authorized(request), "Azure DevOps pull request creation")?;
        tracing::info!(id = ?created.pull_request_id, "opened Azure DevOps pull request");
        Ok(self.resolve_url(&created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const LIST_PATH: &str = "/org/project/_apis/git/repositories/repo/pullrequests";

    #[test]
    fn rejects_slugs_without_three_segments() {
        let err = AzureDevOpsProvider::new("org/repo", AzureToken::Personal("t".into()), None)
            .err()
            .unwrap();
        assert!(matches!(err, DepError::Config(_)));
    }

    #[test]
    fn system_variables_use_bearer_auth() {
        assert_eq!(
            AzureToken::from_env_value("SYSTEM_ACCESSTOKEN", "x".into()),
            AzureToken::Pipeline("x".into())
        );
        assert_eq!(
            AzureToken::from_env_value("AZURE_DEVOPS_TOKEN", "x".into()),
            AzureToken::Personal("x".into())
        );
    }

    #[test]
    fn labels_are_appended_to_the_description_once() {
        let labels = vec!["dependencies".to_string(), "bot".to_string()];
        let once = description_with_labels("Body", &labels);
        assert_eq!(once, "Body\n\nLabels: dependencies, bot");
        assert_eq!(description_with_labels(&once, &labels), once);
        assert_eq!(description_with_labels("Body", &[]), "Body");
    }

    #[test]
    fn updates_existing_pull_request_with_basic_auth() {
        let mut server = mockito::Server::new();
        let lookup = server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api-version".into(), "7.1".into()),
                Matcher::UrlEncoded("searchCriteria.status".into(), "active".into()),
                Matcher::UrlEncoded(
                    "searchCriteria.sourceRefName".into(),
                    "refs/heads/depdetective/autoupdate".into(),
                ),
                Matcher::UrlEncoded("searchCriteria.targetRefName".into(), "refs/heads/main".into()),
            ]))
            .match_header("authorization", "Basic OmFiYzEyMw==")
            .with_status(200)
            .with_body(r#"{"value": [{"pullRequestId": 42}]}"#)
            .create();
        let update = server
            .mock("PATCH", format!("{LIST_PATH}/42").as_str())
            .match_query(Matcher::UrlEncoded("api-version".into(), "7.1".into()))
            .match_body(Matcher::PartialJson(json!({
                "title": "Refreshed",
                "description": "Body\n\nLabels: dependencies"
            })))
            .with_status(200)
            .with_body(r#"{"pullRequestId": 42}"#)
            .create();

        let provider = AzureDevOpsProvider::new(
            "org/project/repo",
            AzureToken::Personal("abc123".into()),
            Some(&server.url()),
        )
        .unwrap();
        let url = provider
            .open_or_update_pr(
                "depdetective/autoupdate",
                "main",
                "Refreshed",
                "Body",
                &["dependencies".to_string()],
            )
            .unwrap();

        assert_eq!(
            url,
            Some(format!("{}/org/project/_git/repo/pullrequest/42", server.url()))
        );
        lookup.assert();
        update.assert();
    }

    #[test]
    fn creates_pull_request_and_reads_web_link() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value": []}"#)
            .create();
        let create = server
            .mock("POST", LIST_PATH)
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer pipeline")
            .match_body(Matcher::PartialJson(json!({
                "sourceRefName": "refs/heads/depdetective/autoupdate",
                "targetRefName": "refs/heads/main"
            })))
            .with_status(201)
            .with_body(
                r#"{"pullRequestId": 5, "_links": {"web": {"href": "https://dev.azure.com/org/project/_git/repo/pullrequest/5"}}}"#,
            )
            .create();

        let provider = AzureDevOpsProvider::new(
            "org/project/repo",
            AzureToken::Pipeline("pipeline".into()),
            Some(&server.url()),
        )
        .unwrap();
        let url = provider
            .open_or_update_pr("depdetective/autoupdate", "main", "Bump", "Body", &[])
            .unwrap();

        assert_eq!(
            url.as_deref(),
            Some("https://dev.azure.com/org/project/_git/repo/pullrequest/5")
        );
        create.assert();
    }

    #[test]
    fn derives_web_url_from_api_url() {
        let pr = PullRequest {
            pull_request_id: Some(8),
            url: Some(
                "https://dev.azure.com/org/project/_apis/git/repositories/abc/pullrequests/8"
                    .to_string(),
            ),
            links: None,
        };
        assert_eq!(
            pr.web_url().as_deref(),
            Some("https://dev.azure.com/org/project/_git/abc/pullrequest/8")
        );
    }
}
