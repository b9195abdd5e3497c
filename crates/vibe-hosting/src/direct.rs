//! Direct REST+GraphQL backend (spec §4.1, "Direct backend").
//!
//! Talks to the hosting REST API with a bearer token and, for
//! projects-v2 attachment, a GraphQL endpoint. Field updates replace
//! whatever scalar is named — unlike the subprocess backend, which can
//! only add labels/assignees, not remove them.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use vibe_retry::RetryExecutor;
use vibe_types::{
    CheckOutcome, Comment, Issue, IssueFields, IssueState, NotFoundKind, PartialFailure, PrFields, PrState,
    PrStatus, PullRequest, ReviewVerdict, VibeError,
};

use crate::HostingClient;

pub const DEFAULT_REST_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const USER_AGENT: &str = concat!("vibe/", env!("CARGO_PKG_VERSION"));

pub struct DirectClient {
    rest_base_url: String,
    graphql_url: String,
    token: String,
    owner: String,
    repo: String,
    client: reqwest::blocking::Client,
    retry: RetryExecutor,
}

impl DirectClient {
    pub fn new(token: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self::with_urls(DEFAULT_REST_BASE_URL, DEFAULT_GRAPHQL_URL, token, owner, repo)
    }

    pub fn with_urls(
        rest_base_url: impl Into<String>,
        graphql_url: impl Into<String>,
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            rest_base_url: rest_base_url.into().trim_end_matches('/').to_string(),
            graphql_url: graphql_url.into(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            client,
            retry: RetryExecutor::from_policy(vibe_retry::RetryPolicy::Default),
        }
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.rest_base_url, self.owner, self.repo, suffix
        )
    }

    fn request_json<B: Serialize>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<reqwest::blocking::Response, VibeError> {
        self.retry.run_vibe(|_attempt| {
            let mut request = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Accept", "application/vnd.github+json");
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send().map_err(|e| classify_transport_error(&e))
        })
    }

    fn graphql<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, VibeError> {
        let response = self.retry.run_vibe(|_attempt| {
            self.client
                .post(&self.graphql_url)
                .header("Authorization", format!("Bearer {}", self.token))
                .json(&json!({ "query": query, "variables": variables }))
                .send()
                .map_err(|e| classify_transport_error(&e))
        })?;

        let envelope: GraphQlEnvelope<T> = response.json().map_err(|e| VibeError::Other(e.into()))?;
        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                return Err(VibeError::transient(
                    "graphql",
                    errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; "),
                ));
            }
        }
        envelope
            .data
            .ok_or_else(|| VibeError::Other(anyhow::anyhow!("graphql response had no data")))
    }

    /// Resolve a project reference (numeric org/user project number, or a
    /// free-form title) to its node ID, per spec §4.1: a numeric string
    /// tries the org project by number then falls back to the user's;
    /// anything else lists up to 100 of the owner's projects and matches
    /// by title.
    fn resolve_project_node_id(&self, project_ref: &str) -> Result<String, VibeError> {
        if let Ok(number) = project_ref.parse::<i64>() {
            if let Ok(id) = self.org_project_node_id(number) {
                return Ok(id);
            }
            return self.user_project_node_id(number);
        }
        self.project_node_id_by_title(project_ref)
    }

    fn org_project_node_id(&self, number: i64) -> Result<String, VibeError> {
        #[derive(Deserialize)]
        struct Data {
            organization: Option<OrgProject>,
        }
        #[derive(Deserialize)]
        struct OrgProject {
            #[serde(rename = "projectV2")]
            project_v2: Option<NodeId>,
        }
        let data: Data = self.graphql(
            "query($login:String!,$number:Int!){organization(login:$login){projectV2(number:$number){id}}}",
            json!({"login": self.owner, "number": number}),
        )?;
        data.organization
            .and_then(|o| o.project_v2)
            .map(|p| p.id)
            .ok_or_else(|| VibeError::not_found(NotFoundKind::Project, number.to_string()))
    }

    fn user_project_node_id(&self, number: i64) -> Result<String, VibeError> {
        #[derive(Deserialize)]
        struct Data {
            user: Option<UserProject>,
        }
        #[derive(Deserialize)]
        struct UserProject {
            #[serde(rename = "projectV2")]
            project_v2: Option<NodeId>,
        }
        let data: Data = self.graphql(
            "query($login:String!,$number:Int!){user(login:$login){projectV2(number:$number){id}}}",
            json!({"login": self.owner, "number": number}),
        )?;
        data.user
            .and_then(|u| u.project_v2)
            .map(|p| p.id)
            .ok_or_else(|| VibeError::not_found(NotFoundKind::Project, number.to_string()))
    }

    fn project_node_id_by_title(&self, title: &str) -> Result<String, VibeError> {
        #[derive(Deserialize)]
        struct Data {
            organization: Option<OrgProjects>,
        }
        #[derive(Deserialize)]
        struct OrgProjects {
            #[serde(rename = "projectsV2")]
            projects_v2: Nodes,
        }
        #[derive(Deserialize)]
        struct Nodes {
            nodes: Vec<TitledNode>,
        }
        #[derive(Deserialize)]
        struct TitledNode {
            id: String,
            title: String,
        }
        let data: Data = self.graphql(
            "query($login:String!){organization(login:$login){projectsV2(first:100){nodes{id title}}}}",
            json!({"login": self.owner}),
        )?;
        data.organization
            .map(|o| o.projects_v2.nodes)
            .unwrap_or_default()
            .into_iter()
            .find(|n| n.title == title)
            .map(|n| n.id)
            .ok_or_else(|| VibeError::not_found(NotFoundKind::Project, title))
    }

    /// Attach `issue_node_id` to each project in `project_refs`. A
    /// partial failure (spec §4.1) surfaces as `VibeError::Partial` with
    /// the successes and failures both named, rather than silently
    /// dropping the ones that didn't resolve.
    fn attach_projects(&self, issue_node_id: &str, project_refs: &[String]) -> Result<(), VibeError> {
        if project_refs.is_empty() {
            return Ok(());
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for project_ref in project_refs {
            let outcome = self
                .resolve_project_node_id(project_ref)
                .and_then(|project_id| self.add_item_to_project(&project_id, issue_node_id));
            match outcome {
                Ok(()) => succeeded.push(project_ref.clone()),
                Err(e) => failed.push((project_ref.clone(), e.to_string())),
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(VibeError::Partial(PartialFailure { succeeded, failed }))
        }
    }

    fn add_item_to_project(&self, project_node_id: &str, content_node_id: &str) -> Result<(), VibeError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "addProjectV2ItemById")]
            #[allow(dead_code)]
            add_project_v2_item_by_id: Option<serde_json::Value>,
        }
        let _: Data = self.graphql(
            "mutation($project:ID!,$content:ID!){addProjectV2ItemById(input:{projectId:$project,contentId:$content}){item{id}}}",
            json!({"project": project_node_id, "content": content_node_id}),
        )?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct NodeId {
    id: String,
}

#[derive(Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl HostingClient for DirectClient {
    fn create_pr(&self, fields: &PrFields, head: &str) -> Result<PullRequest, VibeError> {
        let body = json!({
            "title": fields.title.clone().unwrap_or_default(),
            "body": fields.body.clone().unwrap_or_default(),
            "head": head,
            "base": fields.base.clone().unwrap_or_else(|| "main".to_string()),
            "draft": fields.draft.unwrap_or(false),
        });
        let response = self.request_json(reqwest::Method::POST, &self.repo_path("/pulls"), Some(&body))?;
        handle_status(&response, NotFoundKind::Repository, &format!("{}/{}", self.owner, self.repo))?;
        let wire: PrWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.into_pr())
    }

    fn get_pr(&self, number: u64) -> Result<PullRequest, VibeError> {
        let response = self.request_json::<()>(reqwest::Method::GET, &self.repo_path(&format!("/pulls/{number}")), None)?;
        handle_status(&response, NotFoundKind::PullRequest, &number.to_string())?;
        let wire: PrWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.into_pr())
    }

    fn update_pr(&self, number: u64, fields: &PrFields) -> Result<PullRequest, VibeError> {
        let mut body = serde_json::Map::new();
        if let Some(title) = &fields.title {
            body.insert("title".into(), json!(title));
        }
        if let Some(pr_body) = &fields.body {
            body.insert("body".into(), json!(pr_body));
        }
        if let Some(base) = &fields.base {
            body.insert("base".into(), json!(base));
        }
        if let Some(draft) = fields.draft {
            body.insert("draft".into(), json!(draft));
        }
        let response = self.request_json(
            reqwest::Method::PATCH,
            &self.repo_path(&format!("/pulls/{number}")),
            Some(&serde_json::Value::Object(body)),
        )?;
        handle_status(&response, NotFoundKind::PullRequest, &number.to_string())?;
        let wire: PrWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire.into_pr())
    }

    fn get_pr_status(&self, number: u64) -> Result<PrStatus, VibeError> {
        let reviews_response = self.request_json::<()>(
            reqwest::Method::GET,
            &self.repo_path(&format!("/pulls/{number}/reviews")),
            None,
        )?;
        handle_status(&reviews_response, NotFoundKind::PullRequest, &number.to_string())?;
        let reviews: Vec<ReviewWire> = reviews_response.json().map_err(|e| VibeError::Other(e.into()))?;

        let checks_response = self.request_json::<()>(
            reqwest::Method::GET,
            &self.repo_path(&format!("/commits/pulls/{number}/head/check-runs")),
            None,
        )?;
        let checks: CheckRunsWire = checks_response.json().unwrap_or(CheckRunsWire { check_runs: vec![] });

        let reviews_latest_first = reviews
            .into_iter()
            .rev()
            .map(|r| (r.user.login, r.state.into()));
        let check_outcomes = checks.check_runs.into_iter().map(CheckRunWire::into_outcome);

        Ok(PrStatus::from_reviews_and_checks(reviews_latest_first, check_outcomes))
    }

    fn list_prs(&self, head: Option<&str>) -> Result<Vec<PullRequest>, VibeError> {
        let mut url = self.repo_path("/pulls?state=open");
        if let Some(head) = head {
            url.push_str(&format!("&head={}:{head}", self.owner));
        }
        let response = self.request_json::<()>(reqwest::Method::GET, &url, None)?;
        handle_status(&response, NotFoundKind::Repository, &format!("{}/{}", self.owner, self.repo))?;
        let wires: Vec<PrWire> = response.json().map_err(|e| VibeError::Other(e.into()))?;
        Ok(wires.into_iter().map(PrWire::into_pr).collect())
    }

    fn add_comment(&self, pr_number: u64, body: &str) -> Result<(), VibeError> {
        let payload = json!({ "body": body });
        let response = self.request_json(
            reqwest::Method::POST,
            &self.repo_path(&format!("/issues/{pr_number}/comments")),
            Some(&payload),
        )?;
        handle_status(&response, NotFoundKind::PullRequest, &pr_number.to_string())?;
        Ok(())
    }

    fn get_pr_template(&self) -> Result<Option<String>, VibeError> {
        fetch_template(self, crate::PR_TEMPLATE_PATHS)
    }

    fn create_issue(&self, fields: &IssueFields) -> Result<Issue, VibeError> {
        let body = json!({
            "title": fields.title.clone().unwrap_or_default(),
            "body": fields.body.clone().unwrap_or_default(),
            "assignees": fields.assignees.clone().unwrap_or_default(),
            "labels": fields.labels.clone().unwrap_or_default(),
            "milestone": fields.milestone,
        });
        let response = self.request_json(reqwest::Method::POST, &self.repo_path("/issues"), Some(&body))?;
        handle_status(&response, NotFoundKind::Repository, &format!("{}/{}", self.owner, self.repo))?;
        let wire: IssueWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        let node_id = wire.node_id.clone();
        let issue = wire.into_issue();

        if let Some(projects) = &fields.projects {
            self.attach_projects(&node_id, projects)?;
        }
        Ok(issue)
    }

    fn get_issue(&self, number: u64, include_comments: bool) -> Result<Issue, VibeError> {
        let response = self.request_json::<()>(reqwest::Method::GET, &self.repo_path(&format!("/issues/{number}")), None)?;
        handle_status(&response, NotFoundKind::Issue, &number.to_string())?;
        let wire: IssueWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        let mut issue = wire.into_issue();

        if include_comments {
            let comments_response = self.request_json::<()>(
                reqwest::Method::GET,
                &self.repo_path(&format!("/issues/{number}/comments")),
                None,
            )?;
            let comments: Vec<CommentWire> = comments_response.json().map_err(|e| VibeError::Other(e.into()))?;
            issue.comments = comments.into_iter().map(CommentWire::into_comment).collect();
        }
        Ok(issue)
    }

    fn update_issue(&self, number: u64, fields: &IssueFields) -> Result<Issue, VibeError> {
        let mut body = serde_json::Map::new();
        if let Some(title) = &fields.title {
            body.insert("title".into(), json!(title));
        }
        if let Some(issue_body) = &fields.body {
            body.insert("body".into(), json!(issue_body));
        }
        if let Some(state) = &fields.state {
            body.insert("state".into(), json!(state));
        }
        if let Some(assignees) = &fields.assignees {
            body.insert("assignees".into(), json!(assignees));
        }
        if let Some(labels) = &fields.labels {
            body.insert("labels".into(), json!(labels));
        }
        if let Some(milestone) = &fields.milestone {
            body.insert("milestone".into(), json!(milestone));
        }
        let response = self.request_json(
            reqwest::Method::PATCH,
            &self.repo_path(&format!("/issues/{number}")),
            Some(&serde_json::Value::Object(body)),
        )?;
        handle_status(&response, NotFoundKind::Issue, &number.to_string())?;
        let wire: IssueWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        let node_id = wire.node_id.clone();
        let issue = wire.into_issue();

        if let Some(projects) = &fields.projects {
            self.attach_projects(&node_id, projects)?;
        }
        Ok(issue)
    }

    fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>, VibeError> {
        let state_param = match state {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        };
        let response = self.request_json::<()>(
            reqwest::Method::GET,
            &self.repo_path(&format!("/issues?state={state_param}")),
            None,
        )?;
        handle_status(&response, NotFoundKind::Repository, &format!("{}/{}", self.owner, self.repo))?;
        let wires: Vec<IssueWire> = response.json().map_err(|e| VibeError::Other(e.into()))?;
        // The issues endpoint also returns PRs; filter those out.
        Ok(wires
            .into_iter()
            .filter(|w| w.pull_request.is_none())
            .map(IssueWire::into_issue)
            .collect())
    }

    fn get_issue_template(&self) -> Result<Option<String>, VibeError> {
        fetch_template(self, crate::ISSUE_TEMPLATE_PATHS)
    }

    fn owner_repo(&self) -> (&str, &str) {
        (&self.owner, &self.repo)
    }
}

fn fetch_template(client: &DirectClient, candidates: &[&str]) -> Result<Option<String>, VibeError> {
    for path in candidates {
        let url = client.repo_path(&format!("/contents/{path}"));
        let response = client.request_json::<()>(reqwest::Method::GET, &url, None)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            continue;
        }
        handle_status(&response, NotFoundKind::Other, path)?;
        let wire: ContentWire = response.json().map_err(|e| VibeError::Other(e.into()))?;
        let cleaned: String = wire.content.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, cleaned)
            .map_err(|e| VibeError::Other(anyhow::anyhow!("invalid base64 template content: {e}")))?;
        return Ok(Some(String::from_utf8_lossy(&decoded).to_string()));
    }
    Ok(None)
}

fn classify_transport_error(e: &reqwest::Error) -> VibeError {
    if e.is_timeout() || e.is_connect() {
        VibeError::transient("hosting request", e.to_string())
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
        status if status.is_success() => Ok(()),
        reqwest::StatusCode::NOT_FOUND => {
            if not_found_kind == NotFoundKind::Repository {
                Err(VibeError::repository_not_found(detail))
            } else {
                Err(VibeError::not_found(not_found_kind, detail))
            }
        }
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(VibeError::Authentication {
            service: "github".to_string(),
            token_source: "GITHUB_TOKEN".to_string(),
        }),
        reqwest::StatusCode::CONFLICT => Err(VibeError::Conflict(detail.to_string())),
        status if status.as_u16() == 429 || status.is_server_error() => {
            Err(VibeError::transient("hosting request", status.to_string()))
        }
        status => Err(VibeError::Other(anyhow::anyhow!(
            "unexpected hosting response: {status}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct UserWire {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PrWire {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    draft: bool,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    mergeable: Option<bool>,
    head: RefWire,
    base: RefWire,
    html_url: String,
    user: UserWire,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RefWire {
    #[serde(rename = "ref")]
    git_ref: String,
}

impl PrWire {
    fn into_pr(self) -> PullRequest {
        let state = if self.merged {
            PrState::Merged
        } else if self.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        };
        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            state,
            draft: self.draft,
            mergeable: self.mergeable,
            head: self.head.git_ref,
            base: self.base.git_ref,
            url: self.html_url,
            author: self.user.login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewWire {
    user: UserWire,
    state: ReviewStateWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ReviewStateWire {
    Approved,
    ChangesRequested,
    Commented,
    Pending,
    Dismissed,
}

impl From<ReviewStateWire> for ReviewVerdict {
    fn from(value: ReviewStateWire) -> Self {
        match value {
            ReviewStateWire::Approved => ReviewVerdict::Approved,
            ReviewStateWire::ChangesRequested => ReviewVerdict::ChangesRequested,
            ReviewStateWire::Commented => ReviewVerdict::Commented,
            ReviewStateWire::Pending | ReviewStateWire::Dismissed => ReviewVerdict::Pending,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckRunsWire {
    check_runs: Vec<CheckRunWire>,
}

#[derive(Debug, Deserialize)]
struct CheckRunWire {
    status: String,
    conclusion: Option<String>,
}

impl CheckRunWire {
    fn into_outcome(self) -> CheckOutcome {
        if self.status != "completed" {
            return CheckOutcome::Pending;
        }
        match self.conclusion.as_deref() {
            Some("success") | Some("neutral") | Some("skipped") => CheckOutcome::Passed,
            _ => CheckOutcome::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IssueWire {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    assignees: Vec<UserWire>,
    #[serde(default)]
    labels: Vec<LabelWire>,
    #[serde(default)]
    milestone: Option<MilestoneWire>,
    html_url: String,
    node_id: String,
    user: UserWire,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LabelWire {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MilestoneWire {
    title: String,
}

impl IssueWire {
    fn into_issue(self) -> Issue {
        Issue {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            state: self.state,
            assignees: self.assignees.into_iter().map(|u| u.login).collect::<BTreeSet<_>>(),
            labels: self.labels.into_iter().map(|l| l.name).collect::<BTreeSet<_>>(),
            milestone: self.milestone.map(|m| m.title),
            projects: Vec::new(),
            url: self.html_url,
            author: self.user.login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentWire {
    body: String,
    user: UserWire,
    created_at: DateTime<Utc>,
}

impl CommentWire {
    fn into_comment(self) -> Comment {
        Comment {
            author: self.user.login,
            body: self.body,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentWire {
    content: String,
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
                    let mut buf = [0u8; 4096];
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

    fn pr_json() -> &'static str {
        r#"{
            "number": 42,
            "title": "Fix login bug",
            "body": "details",
            "state": "open",
            "draft": false,
            "mergeable": true,
            "head": {"ref": "feature/abc123xyz/fix-login"},
            "base": {"ref": "main"},
            "html_url": "https://github.com/acme/widgets/pull/42",
            "user": {"login": "rhuot"},
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        }"#
    }

    #[test]
    fn get_pr_decodes_into_pull_request() {
        let (url, handle) = spawn_mock(vec![(200, pr_json())]);
        let client = DirectClient::with_urls(url.clone(), format!("{url}/graphql"), "tok", "acme", "widgets");

        let pr = client.get_pr(42).unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.base, "main");
        assert_eq!(pr.state, PrState::Open);
        handle.join().unwrap();
    }

    #[test]
    fn get_pr_not_found_maps_to_pull_request_not_found() {
        let (url, handle) = spawn_mock(vec![(404, "{}")]);
        let client = DirectClient::with_urls(url.clone(), format!("{url}/graphql"), "tok", "acme", "widgets");

        let err = client.get_pr(42).unwrap_err();
        match err {
            VibeError::NotFound { resource, .. } => assert_eq!(resource, NotFoundKind::PullRequest),
            other => panic!("expected NotFound, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn unauthorized_maps_to_authentication_error() {
        let (url, handle) = spawn_mock(vec![(401, "{}")]);
        let client = DirectClient::with_urls(url.clone(), format!("{url}/graphql"), "bad", "acme", "widgets");

        let err = client.get_pr(1).unwrap_err();
        assert!(matches!(err, VibeError::Authentication { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn check_run_wire_classifies_outcomes() {
        let passed = CheckRunWire {
            status: "completed".into(),
            conclusion: Some("success".into()),
        };
        assert_eq!(passed.into_outcome(), CheckOutcome::Passed);

        let failed = CheckRunWire {
            status: "completed".into(),
            conclusion: Some("failure".into()),
        };
        assert_eq!(failed.into_outcome(), CheckOutcome::Failed);

        let pending = CheckRunWire {
            status: "in_progress".into(),
            conclusion: None,
        };
        assert_eq!(pending.into_outcome(), CheckOutcome::Pending);
    }

    #[test]
    fn owner_repo_reflects_construction() {
        let client = DirectClient::new("tok", "acme", "widgets");
        assert_eq!(client.owner_repo(), ("acme", "widgets"));
    }
}
