use super::{Provider, encode_segment, http_client, send_json, trim_host};
use crate::error::Result;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;

const DEFAULT_HOST: &str = "https://gitlab.com";

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    web_url: Option<String>,
}

/// GitLab merge requests via the v4 API, authenticated with `PRIVATE-TOKEN`.
pub struct GitLabProvider {
    client: Client,
    project_id: String,
    token: String,
    host: String,
}

impl GitLabProvider {
    pub fn new(repo: impl AsRef<str>, token: impl Into<String>, host: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            project_id: encode_segment(repo.as_ref()),
            token: token.into(),
            host: trim_host(host, DEFAULT_HOST),
        })
    }

    fn merge_requests_url(&self) -> String {
        format!("{}/api/v4/projects/{}/merge_requests", self.host, self.project_id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("PRIVATE-TOKEN", &self.token)
    }
}

impl Provider for GitLabProvider {
    fn open_or_update_pr(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Option<String>> {
        let lookup = self.client.get(self.merge_requests_url()).query(&[
            ("state", "opened"),
            ("source_branch", source_branch),
            ("target_branch", target_branch),
        ]);
        let existing: Vec<MergeRequest> =
            send_json(self.authorized(lookup), "GitLab merge request lookup")?;
        let label_csv = labels.join(",");

        if let Some(mr) = existing.first() {
            tracing::info!(iid = mr.iid, "updating existing GitLab merge request");
            let request = self
                .client
                .put(format!("{}/{}", self.merge_requests_url(), mr.iid))
                .form(&[
                    ("title", title),
                    ("description", body),
                    ("labels", label_csv.as_str()),
                ]);
            let updated: MergeRequest =
                send_json(self.authorized(request), "GitLab merge request update")?;
            return Ok(updated.web_url);
        }

        let request = self.client.post(self.merge_requests_url()).form(&[
            ("source_branch", source_branch),
            ("target_branch", target_branch),
            ("title", title),
            ("description", body),
            ("labels", label_csv.as_str()),
        ]);
        let created: MergeRequest =
            send_json(self.authorized(request), "GitLab merge request creation")?;
        tracing::info!(iid = created.iid, "opened GitLab merge request");
        Ok(created.web_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn updates_existing_merge_request_in_nested_group() {
        let mut server = mockito::Server::new();
        let lookup = server
            .mock("GET", "/api/v4/projects/group%2Fsub%2Fapp/merge_requests")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "opened".into()),
                Matcher::UrlEncoded("source_branch".into(), "depdetective/autoupdate".into()),
                Matcher::UrlEncoded("target_branch".into(), "main".into()),
            ]))
            .match_header("private-token", "glpat")
            .with_status(200)
            .with_body(r#"[{"iid": 3, "web_url": "https://gitlab.com/group/sub/app/-/merge_requests/3"}]"#)
            .create();
        let update = server
            .mock("PUT", "/api/v4/projects/group%2Fsub%2Fapp/merge_requests/3")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("title".into(), "Refreshed".into()),
                Matcher::UrlEncoded("labels".into(), "dependencies,security".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"iid": 3, "web_url": "https://gitlab.com/group/sub/app/-/merge_requests/3"}"#)
            .create();

        let provider = GitLabProvider::new("group/sub/app", "glpat", Some(&server.url())).unwrap();
        let url = provider
            .open_or_update_pr(
                "depdetective/autoupdate",
                "main",
                "Refreshed",
                "Body",
                &["dependencies".to_string(), "security".to_string()],
            )
            .unwrap();

        assert_eq!(
            url.as_deref(),
            Some("https://gitlab.com/group/sub/app/-/merge_requests/3")
        );
        lookup.assert();
        update.assert();
    }

    #[test]
    fn opens_merge_request_when_none_is_open() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v4/projects/group%2Fapp/merge_requests")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create();
        let create = server
            .mock("POST", "/api/v4/projects/group%2Fapp/merge_requests")
            .match_body(Matcher::UrlEncoded("source_branch".into(), "depdetective/autoupdate".into()))
            .with_status(201)
            .with_body(r#"{"iid": 9, "web_url": "https://gitlab.com/group/app/-/merge_requests/9"}"#)
            .create();

        let provider = GitLabProvider::new("group/app", "glpat", Some(&server.url())).unwrap();
        let url = provider
            .open_or_update_pr("depdetective/autoupdate", "main", "Bump", "Body", &[])
            .unwrap();

        assert_eq!(url.as_deref(), Some("https://gitlab.com/group/app/-/merge_requests/9"));
        create.assert();
    }
}
