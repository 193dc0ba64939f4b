//! Request and response bodies for the issue tracker REST API.
//!
//! The wire format follows the v2 REST conventions: issue creation posts a
//! `fields` envelope, reads come back with the same envelope, and search
//! results page through `startAt`/`total`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Domain-facing input
// ============================================================================

/// A new issue to create, expressed in domain terms.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub project_key: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub assignee: Option<String>,
}

// ============================================================================
// Issue creation
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CreateIssueRequest {
    pub fields: CreateIssueFields,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateIssueFields {
    pub project: ProjectRef,
    pub summary: String,
    pub description: String,
    pub issuetype: NameRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<NameRef>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProjectRef {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NameRef {
    pub name: String,
}

impl CreateIssueRequest {
    pub fn from_new_issue(issue: &NewIssue) -> Self {
        Self {
            fields: CreateIssueFields {
                project: ProjectRef {
                    key: issue.project_key.clone(),
                },
                summary: issue.summary.clone(),
                description: issue.description.clone(),
                issuetype: NameRef {
                    name: issue.issue_type.clone(),
                },
                assignee: issue.assignee.clone().map(|name| NameRef { name }),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateIssueResponse {
    pub key: String,
}

// ============================================================================
// Issue read
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct IssueResponse {
    pub fields: IssueFieldsWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssueFieldsWire {
    pub status: StatusRef,
    pub assignee: Option<NameRef>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRef {
    pub name: String,
}

/// Current state of a tracked issue, as read from the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueState {
    pub status: String,
    pub assignee: Option<String>,
}

impl From<IssueFieldsWire> for IssueState {
    fn from(wire: IssueFieldsWire) -> Self {
        Self {
            status: wire.status.name,
            assignee: wire.assignee.map(|a| a.name),
        }
    }
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub issues: Vec<SearchIssueWire>,
    pub total: usize,
    #[serde(rename = "startAt")]
    #[allow(dead_code)]
    pub start_at: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchIssueWire {
    pub key: String,
    pub fields: IssueFieldsWire,
}

/// A search hit: issue key plus the fields the reconciler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSummary {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee: Option<String>,
}

impl From<SearchIssueWire> for IssueSummary {
    fn from(wire: SearchIssueWire) -> Self {
        Self {
            key: wire.key,
            summary: wire.fields.summary.unwrap_or_default(),
            status: wire.fields.status.name,
            assignee: wire.fields.assignee.map(|a| a.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_serializes_fields_envelope() {
        let issue = NewIssue {
            project_key: "CON".to_string(),
            summary: "Review batch".to_string(),
            description: "table".to_string(),
            issue_type: "Task".to_string(),
            assignee: Some("reviewer".to_string()),
        };
        let body = serde_json::to_value(CreateIssueRequest::from_new_issue(&issue)).unwrap();
        assert_eq!(body["fields"]["project"]["key"], "CON");
        assert_eq!(body["fields"]["summary"], "Review batch");
        assert_eq!(body["fields"]["issuetype"]["name"], "Task");
        assert_eq!(body["fields"]["assignee"]["name"], "reviewer");
    }

    #[test]
    fn create_request_omits_missing_assignee() {
        let issue = NewIssue {
            project_key: "CON".to_string(),
            summary: "s".to_string(),
            description: "d".to_string(),
            issue_type: "Fault".to_string(),
            assignee: None,
        };
        let body = serde_json::to_value(CreateIssueRequest::from_new_issue(&issue)).unwrap();
        assert!(body["fields"].get("assignee").is_none());
    }

    #[test]
    fn issue_state_maps_nullable_assignee() {
        let wire: IssueResponse = serde_json::from_str(
            r#"{"fields": {"status": {"name": "Done"}, "assignee": null}}"#,
        )
        .unwrap();
        let state = IssueState::from(wire.fields);
        assert_eq!(state.status, "Done");
        assert!(state.assignee.is_none());
    }

    #[test]
    fn search_hit_defaults_missing_summary() {
        let wire: SearchIssueWire = serde_json::from_str(
            r#"{"key": "CON-1", "fields": {"status": {"name": "Open"}, "assignee": {"name": "a"}}}"#,
        )
        .unwrap();
        let hit = IssueSummary::from(wire);
        assert_eq!(hit.key, "CON-1");
        assert_eq!(hit.summary, "");
        assert_eq!(hit.assignee.as_deref(), Some("a"));
    }
}
