//! HTTP client for the issue tracker REST API.
//!
//! All requests use basic auth. Non-2xx responses surface as
//! [`Error::Tracker`] with the response body attached, except issue reads
//! where a 404 means the issue no longer exists and maps to `None`.

use std::time::Duration;

use reqwest::multipart;
use reqwest::StatusCode;
use tracing::{debug, warn};

use consentry_core::defaults::{SEARCH_PAGE_SIZE, TRACKER_TIMEOUT_SECS};
use consentry_core::{Error, Result};

use crate::types::{
    CreateIssueRequest, CreateIssueResponse, IssueResponse, IssueState, IssueSummary, NewIssue,
    SearchResponse,
};

/// Connection settings for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Base URL of the tracker, without a trailing slash.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl TrackerConfig {
    pub fn new(base_url: String, username: String, password: String) -> Self {
        Self {
            base_url,
            username,
            password,
            timeout_secs: TRACKER_TIMEOUT_SECS,
        }
    }

    /// Read tracker settings from the environment.
    ///
    /// Requires `CONSENTRY_TRACKER_URL`, `CONSENTRY_TRACKER_USER`, and
    /// `CONSENTRY_TRACKER_PASSWORD`. `CONSENTRY_TRACKER_TIMEOUT_SECS` is
    /// optional.
    pub fn from_env() -> Result<Self> {
        let base_url = require_env("CONSENTRY_TRACKER_URL")?;
        let username = require_env("CONSENTRY_TRACKER_USER")?;
        let password = require_env("CONSENTRY_TRACKER_PASSWORD")?;
        let timeout_secs = std::env::var("CONSENTRY_TRACKER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(TRACKER_TIMEOUT_SECS);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            timeout_secs,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
}

/// Client for creating, reading, and searching tracker issues.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    client: reqwest::Client,
    config: TrackerConfig,
}

impl TrackerClient {
    /// Build a client from explicit settings. Construction fails only on
    /// a broken TLS or connector setup, which is fatal for the process.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(TrackerConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Create an issue and return its key.
    pub async fn create_issue(&self, issue: &NewIssue) -> Result<String> {
        let body = CreateIssueRequest::from_new_issue(issue);
        let response = self
            .client
            .post(self.url("/rest/api/2/issue"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body)
            .send()
            .await?;

        let response = check_status(response, "create issue").await?;
        let created: CreateIssueResponse = response.json().await?;

        debug!(
            subsystem = "tracker",
            component = "client",
            op = "create_issue",
            issue_key = %created.key,
            issue_type = %issue.issue_type,
            "Created tracker issue"
        );
        Ok(created.key)
    }

    /// Attach a PNG to an existing issue.
    pub async fn add_png_attachment(
        &self,
        issue_key: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/png")
            .map_err(|e| Error::Tracker(format!("Invalid attachment part: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("/rest/api/2/issue/{}/attachments", issue_key)))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("X-Atlassian-Token", "no-check")
            .multipart(form)
            .send()
            .await?;

        check_status(response, "upload attachment").await?;
        debug!(
            subsystem = "tracker",
            component = "client",
            op = "add_png_attachment",
            issue_key = %issue_key,
            filename = %filename,
            "Uploaded issue attachment"
        );
        Ok(())
    }

    /// Read an issue's current status and assignee.
    ///
    /// Returns `None` when the issue does not exist anymore; deletion on
    /// the tracker side is a normal lifecycle event, not an error.
    pub async fn get_issue(&self, issue_key: &str) -> Result<Option<IssueState>> {
        let response = self
            .client
            .get(self.url(&format!("/rest/api/2/issue/{}", issue_key)))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(
                subsystem = "tracker",
                component = "client",
                op = "get_issue",
                issue_key = %issue_key,
                "Issue no longer exists on the tracker"
            );
            return Ok(None);
        }

        let response = check_status(response, "get issue").await?;
        let issue: IssueResponse = response.json().await?;
        Ok(Some(IssueState::from(issue.fields)))
    }

    /// Run a JQL search, following pagination until every hit is in hand.
    pub async fn search(&self, jql: &str) -> Result<Vec<IssueSummary>> {
        let mut hits: Vec<IssueSummary> = Vec::new();
        let mut total = usize::MAX;

        while hits.len() != total {
            let response = self
                .client
                .get(self.url("/rest/api/2/search"))
                .basic_auth(&self.config.username, Some(&self.config.password))
                .query(&[
                    ("jql", jql),
                    ("startAt", &hits.len().to_string()),
                    ("maxResults", &SEARCH_PAGE_SIZE.to_string()),
                ])
                .send()
                .await?;

            let response = check_status(response, "search issues").await?;
            let page: SearchResponse = response.json().await?;
            total = page.total;
            if page.issues.is_empty() && hits.len() != total {
                return Err(Error::Tracker(format!(
                    "Search returned an empty page at offset {} with {} total",
                    hits.len(),
                    total
                )));
            }
            hits.extend(page.issues.into_iter().map(IssueSummary::from));
        }

        debug!(
            subsystem = "tracker",
            component = "client",
            op = "search",
            hit_count = hits.len(),
            "Search complete"
        );
        Ok(hits)
    }
}

/// Parameters for a prefilled issue-creation link.
///
/// Review-table rows embed these links so a reviewer can raise a fault
/// issue for an attachment in one click, straight from the tracker UI.
#[derive(Debug, Clone)]
pub struct FaultLink {
    pub reporter: String,
    pub assignee: String,
    pub issue_type_id: String,
    /// Numeric project id. When absent the UI prompts for a project.
    pub project_id: Option<String>,
    pub summary: String,
    pub description: String,
}

/// Build a prefilled issue-creation URL for the tracker's web UI.
pub fn fault_creation_url(base_url: &str, link: &FaultLink) -> Result<String> {
    let mut params: Vec<(&str, &str)> = vec![
        ("reporter", link.reporter.as_str()),
        ("issuetype", link.issue_type_id.as_str()),
        ("assignee", link.assignee.as_str()),
        ("summary", link.summary.as_str()),
        ("description", link.description.as_str()),
    ];
    if let Some(pid) = &link.project_id {
        params.push(("pid", pid.as_str()));
    }

    let url = reqwest::Url::parse_with_params(
        &format!("{}/secure/CreateIssueDetails!init.jspa", base_url),
        &params,
    )
    .map_err(|e| Error::InvalidInput(format!("Invalid tracker base url: {}", e)))?;
    Ok(url.into())
}

/// Map a non-2xx response to [`Error::Tracker`] with the body attached.
async fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Tracker(format!(
        "Failed to {} ({}): {}",
        context,
        status,
        body.trim()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_timeout() {
        let config = TrackerConfig::new(
            "http://tracker.local".to_string(),
            "svc".to_string(),
            "secret".to_string(),
        );
        assert_eq!(config.timeout_secs, TRACKER_TIMEOUT_SECS);
    }

    #[test]
    fn fault_link_encodes_query_parameters() {
        let link = FaultLink {
            reporter: "svc".to_string(),
            assignee: "reviewer".to_string(),
            issue_type_id: "3".to_string(),
            project_id: Some("11438".to_string()),
            summary: "Consent form fault File abc".to_string(),
            description: "Original location bucket/key".to_string(),
        };
        let url = fault_creation_url("http://tracker.local", &link).unwrap();
        assert!(url.starts_with("http://tracker.local/secure/CreateIssueDetails!init.jspa?"));
        assert!(url.contains("summary=Consent+form+fault+File+abc"));
        assert!(url.contains("pid=11438"));
    }

    #[test]
    fn fault_link_omits_missing_project_id() {
        let link = FaultLink {
            reporter: "svc".to_string(),
            assignee: "reviewer".to_string(),
            issue_type_id: "3".to_string(),
            project_id: None,
            summary: "s".to_string(),
            description: "d".to_string(),
        };
        let url = fault_creation_url("http://tracker.local", &link).unwrap();
        assert!(!url.contains("pid="));
    }

    #[test]
    fn client_joins_base_url_and_path() {
        let client = TrackerClient::new(TrackerConfig::new(
            "http://tracker.local".to_string(),
            "svc".to_string(),
            "secret".to_string(),
        ))
        .unwrap();
        assert_eq!(
            client.url("/rest/api/2/issue"),
            "http://tracker.local/rest/api/2/issue"
        );
    }
}
