use super::{Provider, http_client, send_checked, send_json, trim_host};
use crate::error::Result;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_HOST: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    html_url: Option<String>,
}

/// GitHub pull requests via the REST API.
pub struct GitHubProvider {
    client: Client,
    repo: String,
    token: String,
    host: String,
}

impl GitHubProvider {
    /// `repo` is the `owner/name` slug; `host` defaults to the public API.
    pub fn new(repo: impl Into<String>, token: impl Into<String>, host: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            repo: repo.into(),
            token: token.into(),
            host: trim_host(host, DEFAULT_HOST),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    fn owner(&self) -> &str {
        self.repo.split('/').next().unwrap_or(&self.repo)
    }

    fn find_open(&self, source_branch: &str, target_branch: &str) -> Result<Vec<PullRequest>> {
        let head = format!("{}:{source_branch}", self.owner());
        let request = self
            .client
            .get(format!("{}/repos/{}/pulls", self.host, self.repo))
            .query(&[
                ("state", "open"),
                ("head", head.as_str()),
                ("base", target_branch),
            ]);
        send_json(self.authorized(request), "GitHub pull request lookup")
    }

    fn set_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(format!("{}/repos/{}/issues/{number}/labels", self.host, self.repo))
            .json(&json!({ "labels": labels }));
        send_checked(self.authorized(request), "GitHub label update")?;
        Ok(())
    }
}

impl Provider for GitHubProvider {
    fn open_or_update_pr(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Option<String>> {
        let existing = self.find_open(source_branch, target_branch)?;

        if let Some(pr) = existing.first() {
            tracing::info!(number = pr.number, "updating existing GitHub pull request");
            let request = self
                .client
                .patch(format!("{}/repos/{}/pulls/{}", self.host, self.repo, pr.number))
                .json(&json!({ "title": title, "body": body }));
            let updated: PullRequest =
                send_json(self.authorized(request), "GitHub pull request update")?;
            self.set_labels(pr.number, labels)?;
            return Ok(updated.html_url);
        }

        let request = self
            .client
            .post(format!("{}/repos/{}/pulls", self.host, self.repo))
            .json(&json!({
                "title": title,
                "head": source_branch,
                "base": target_branch,
                "body": body,
            }));
        let created: PullRequest =
            send_json(self.authorized(request), "GitHub pull request creation")?;
        tracing::info!(number = created.number, "opened GitHub pull request");
        self.set_labels(created.number, labels)?;
        Ok(created.html_url)
    }
}
