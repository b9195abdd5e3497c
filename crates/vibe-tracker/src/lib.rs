//! Task-tracker REST client (spec §4.2).
//!
//! A thin bearer-token client. Every response is decoded through a
//! tracker-shaped wire layer and unboxed into [`vibe_types::Ticket`] —
//! callers never see the tracker's own JSON shape. Custom fields come
//! back as a heterogeneous list; [`Ticket::custom_field`] is the only
//! way to read one, and there is no write path for them (the tracker's
//! contract doesn't expose custom-field writes).

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vibe_retry::RetryExecutor;
use vibe_types::{Comment, FieldValue, NotFoundKind, Ticket, VibeError};

pub const DEFAULT_BASE_URL: &str = "https://api.clickup.com/api/v2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const USER_AGENT: &str = concat!("vibe/", env!("CARGO_PKG_VERSION"));

pub struct TrackerClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
    retry: RetryExecutor,
}

impl TrackerClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            retry: RetryExecutor::from_policy(vibe_retry::RetryPolicy::Default),
        }
    }

    fn get(&self, path: &str) -> Result<reqwest::blocking::Response, VibeError> {
        self.retry.run_vibe(|_attempt| {
            self.client
                .get(format!("{}{}", self.base_url, path))
                .header("Authorization", &self.token)
                .send()
                .map_err(|e| classify_transport_error(&e))
        })
    }

    fn request_json<T: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &T,
    ) -> Result<reqwest::blocking::Response, VibeError> {
        self.retry.run_vibe(|_attempt| {
            self.client
                .request(method.clone(), format!("{}{}", self.base_url, path))
                .header("Authorization", &self.token)
                .json(body)
                .send()
                .map_err(|e| classify_transport_error(&e))
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<Ticket, VibeError> {
        let response = self.get(&format!("/task/{task_id}"))?;
        handle_status(&response, NotFoundKind::Ticket, task_id)?;
        let wire: TaskWire = response
            .json()
            .map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.into_ticket())
    }

    pub fn list_tasks(&self, list_id: &str, filters: &TaskFilters) -> Result<Vec<Ticket>, VibeError> {
        let query = filters.to_query_string();
        let response = self.get(&format!("/list/{list_id}/task{query}"))?;
        handle_status(&response, NotFoundKind::Other, list_id)?;
        let wire: TasksWire = response
            .json()
            .map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.tasks.into_iter().map(TaskWire::into_ticket).collect())
    }

    pub fn update_task(&self, task_id: &str, fields: &UpdateFields) -> Result<Ticket, VibeError> {
        let response = self.request_json(reqwest::Method::PUT, &format!("/task/{task_id}"), fields)?;
        handle_status(&response, NotFoundKind::Ticket, task_id)?;
        let wire: TaskWire = response
            .json()
            .map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.into_ticket())
    }

    pub fn add_comment(&self, task_id: &str, text: &str) -> Result<(), VibeError> {
        let body = CommentRequest {
            comment_text: text.to_string(),
        };
        let response = self.request_json(reqwest::Method::POST, &format!("/task/{task_id}/comment"), &body)?;
        handle_status(&response, NotFoundKind::Ticket, task_id)?;
        Ok(())
    }

    pub fn get_folders(&self, space_id: &str) -> Result<Vec<Folder>, VibeError> {
        let response = self.get(&format!("/space/{space_id}/folder"))?;
        handle_status(&response, NotFoundKind::Other, space_id)?;
        let wire: FoldersWire = response
            .json()
            .map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.folders)
    }

    pub fn search_team_tasks(&self, team_id: &str, search_term: &str) -> Result<Vec<Ticket>, VibeError> {
        let query = format!("?search={}", urlencode(search_term));
        let response = self.get(&format!("/team/{team_id}/task{query}"))?;
        handle_status(&response, NotFoundKind::Other, team_id)?;
        let wire: TasksWire = response
            .json()
            .map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.tasks.into_iter().map(TaskWire::into_ticket).collect())
    }
}

fn classify_transport_error(e: &reqwest::Error) -> VibeError {
    if e.is_timeout() || e.is_connect() {
        VibeError::transient("tracker request", e.to_string())
    } else {
        VibeError::Other(anyhow::anyhow!(e.to_string()))
    }
}

fn handle_status(
    response: &reqwest::blocking::Response,
    not_found_kind: NotFoundKind,
    detail: &str,
) -> Result<(), VibeError> {
    match response.status() {
        reqwest::StatusCode::OK | reqwest::StatusCode::CREATED => Ok(()),
        reqwest::StatusCode::NOT_FOUND => Err(VibeError::not_found(not_found_kind, detail)),
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Err(VibeError::Authentication {
                service: "clickup".to_string(),
                token_source: "CLICKUP_API_TOKEN".to_string(),
            })
        }
        status if status.as_u16() == 429 || status.is_server_error() => {
            Err(VibeError::transient("tracker request", status.to_string()))
        }
        status => Err(VibeError::Other(anyhow::anyhow!(
            "unexpected tracker response: {status}"
        ))),
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

/// Filters accepted by `ListTasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub statuses: Vec<String>,
    pub assignees: Vec<String>,
}

impl TaskFilters {
    fn to_query_string(&self) -> String {
        let mut params = Vec::new();
        for status in &self.statuses {
            params.push(format!("statuses[]={}", urlencode(status)));
        }
        for assignee in &self.assignees {
            params.push(format!("assignees[]={}", urlencode(assignee)));
        }
        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

/// Fields `UpdateTask` may write. The tracker's contract does not expose
/// custom-field writes, so there is deliberately no such field here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct CommentRequest {
    comment_text: String,
}

#[derive(Debug, Deserialize)]
struct FoldersWire {
    folders: Vec<Folder>,
}

#[derive(Debug, Deserialize)]
struct TasksWire {
    tasks: Vec<TaskWire>,
}

#[derive(Debug, Deserialize)]
struct TaskWire {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    status: TaskStatusWire,
    #[serde(default)]
    assignees: Vec<AssigneeWire>,
    url: String,
    #[serde(default)]
    custom_fields: Vec<CustomFieldWire>,
    #[serde(default)]
    comments: Vec<CommentWire>,
}

#[derive(Debug, Deserialize)]
struct TaskStatusWire {
    status: String,
}

#[derive(Debug, Deserialize)]
struct AssigneeWire {
    username: String,
}

#[derive(Debug, Deserialize)]
struct CustomFieldWire {
    name: String,
    #[serde(default)]
    value: FieldValue,
}

#[derive(Debug, Deserialize)]
struct CommentWire {
    #[serde(rename = "comment_text")]
    body: String,
    user: AssigneeWire,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    date: DateTime<Utc>,
}

impl TaskWire {
    fn into_ticket(self) -> Ticket {
        let mut custom_fields = BTreeMap::new();
        for field in self.custom_fields {
            custom_fields.insert(field.name, field.value);
        }

        Ticket {
            id: self.id,
            title: self.name,
            description: self.description,
            status: self.status.status,
            assignees: self.assignees.into_iter().map(|a| a.username).collect::<BTreeSet<_>>(),
            url: self.url,
            custom_fields,
            comments: self
                .comments
                .into_iter()
                .map(|c| Comment {
                    author: c.user.username,
                    body: c.body,
                    created_at: c.date,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn spawn_mock(responses: Vec<(u16, &'static str)>) -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            for (status, body) in responses {
                if let Ok((mut stream, _)) = listener.accept() {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let response = format!(
                        "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes());
                }
            }
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn get_task_decodes_into_ticket() {
        let body = r#"{
            "id": "abc123def",
            "name": "Fix login bug",
            "description": "details",
            "status": {"status": "in progress"},
            "assignees": [{"username": "rhuot"}],
            "url": "https://app.clickup.com/t/abc123def",
            "custom_fields": [{"name": "Sprint", "value": "Sprint 12"}],
            "comments": []
        }"#;
        let (url, handle) = spawn_mock(vec![(200, body)]);
        let client = TrackerClient::new(url, "token");

        let ticket = client.get_task("abc123def").unwrap();
        assert_eq!(ticket.title, "Fix login bug");
        assert_eq!(ticket.status, "in progress");
        assert_eq!(ticket.custom_field("Sprint"), Some("Sprint 12".to_string()));
        assert!(ticket.assignees.contains("rhuot"));
        handle.join().unwrap();
    }

    #[test]
    fn get_task_not_found_maps_to_ticket_not_found() {
        let (url, handle) = spawn_mock(vec![(404, "{}")]);
        let client = TrackerClient::new(url, "token");

        let err = client.get_task("missing12").unwrap_err();
        match err {
            VibeError::NotFound { resource, .. } => assert_eq!(resource, NotFoundKind::Ticket),
            other => panic!("expected NotFound, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn unauthorized_maps_to_authentication_error() {
        let (url, handle) = spawn_mock(vec![(401, "{}")]);
        let client = TrackerClient::new(url, "bad-token");

        let err = client.get_task("abc123def").unwrap_err();
        assert!(matches!(err, VibeError::Authentication { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn task_filters_build_query_string() {
        let filters = TaskFilters {
            statuses: vec!["in progress".to_string()],
            assignees: vec!["rhuot".to_string()],
        };
        let query = filters.to_query_string();
        assert!(query.starts_with('?'));
        assert!(query.contains("statuses%5B%5D=in%20progress") || query.contains("statuses[]=in"));
        assert!(query.contains("assignees"));
    }

    #[test]
    fn update_fields_skips_unset_values() {
        let fields = UpdateFields {
            status: Some("doing".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"status":"doing"}"#);
    }
}
