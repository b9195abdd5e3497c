//! Core domain types shared across the vibe workspace.
//!
//! This crate defines the data shapes that flow between the task-tracker,
//! hosting, and CI integrations and the workflow engine: [`Ticket`],
//! [`BranchName`], [`PullRequest`]/[`PrStatus`], [`Issue`], [`CiStatus`], and
//! the [`VibeError`] taxonomy every integration returns through.
//!
//! Nothing in here talks to the network or the filesystem — it is the
//! vocabulary the rest of the workspace is written in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{PartialFailure, VibeError};

/// A 9-character lowercase-alphanumeric task-tracker identifier.
///
/// Construction is intentionally not validated here — [`vibe_validate`]
/// owns the `IsTicketID` predicate. This type exists so call sites that
/// already hold a validated ID don't re-pass bare `String`s.
pub type TicketId = String;

/// A single value in a ticket's custom-field mapping.
///
/// The tracker's wire format is heterogeneous (strings, numbers, lists of
/// user objects, etc.); we only need to read fields back out as text, per
/// the contract in spec §4.2, so the polymorphic cases are collapsed to
/// their string rendering at the accessor rather than modeled exhaustively.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    #[default]
    Null,
}

impl FieldValue {
    /// Render the value as a display string, or `None` for `Null`/empty lists.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) if !s.is_empty() => Some(s.clone()),
            FieldValue::Text(_) => None,
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::List(items) => {
                let rendered: Vec<String> = items.iter().filter_map(FieldValue::as_text).collect();
                if rendered.is_empty() {
                    None
                } else {
                    Some(rendered.join(", "))
                }
            }
            FieldValue::Null => None,
        }
    }
}

/// A comment left on a ticket or issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A task-tracker work item.
///
/// Status is the only field the core mutates (via `UpdateTask`); everything
/// else is fetched and treated as read-only context for branch naming and
/// PR body composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,
    pub status: String,
    pub assignees: BTreeSet<String>,
    pub url: String,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Ticket {
    /// Look up a custom field by name and render it as text, per the
    /// tracker contract's "string or missing" accessor shape.
    pub fn custom_field(&self, name: &str) -> Option<String> {
        self.custom_fields.get(name).and_then(FieldValue::as_text)
    }
}

/// A validated, path-segmented branch name: `<prefix>/<ticket-id>/<slug>`
/// or `<prefix>/<slug>` when there is no associated ticket.
///
/// The only way to get one is [`BranchName::validate`] — every other part
/// of the workspace that needs to reason about a branch string takes this
/// type, not `&str`, so the invariants in spec §3 hold at the type level
/// past construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Wrap an already-validated string. Callers outside `vibe-validate`
    /// should go through `vibe_validate::validate_branch_name` instead.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Open/closed/merged state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

/// A pull request as returned by the hosting client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: PrState,
    pub draft: bool,
    pub mergeable: Option<bool>,
    pub head: String,
    pub base: String,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single reviewer's latest verdict on a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    ChangesRequested,
    Commented,
    Pending,
}

/// Pass/fail/pending tri-state for a single CI status check on a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    Pending,
}

/// Aggregated review and check state for a PR, per spec §3.
///
/// Review counts are derived by keeping only the latest verdict per
/// distinct reviewer login — a reviewer who commented and later approved
/// is counted once, as approved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrStatus {
    pub approved: u32,
    pub changes_requested: u32,
    pub commented: u32,
    pub review_pending: u32,
    pub checks_passed: u32,
    pub checks_failed: u32,
    pub checks_pending: u32,
}

impl PrStatus {
    /// Fold a raw, possibly-duplicated review list into aggregate counts,
    /// keeping only each reviewer's most recent verdict.
    pub fn from_reviews_and_checks(
        reviews_by_reviewer_latest_first: impl IntoIterator<Item = (String, ReviewVerdict)>,
        checks: impl IntoIterator<Item = CheckOutcome>,
    ) -> Self {
        let mut latest: BTreeMap<String, ReviewVerdict> = BTreeMap::new();
        for (reviewer, verdict) in reviews_by_reviewer_latest_first {
            latest.entry(reviewer).or_insert(verdict);
        }

        let mut status = PrStatus::default();
        for verdict in latest.values() {
            match verdict {
                ReviewVerdict::Approved => status.approved += 1,
                ReviewVerdict::ChangesRequested => status.changes_requested += 1,
                ReviewVerdict::Commented => status.commented += 1,
                ReviewVerdict::Pending => status.review_pending += 1,
            }
        }

        for outcome in checks {
            match outcome {
                CheckOutcome::Passed => status.checks_passed += 1,
                CheckOutcome::Failed => status.checks_failed += 1,
                CheckOutcome::Pending => status.checks_pending += 1,
            }
        }

        status
    }

    /// Readiness per spec §4.4: CI passed, nothing pending, at least one
    /// approval, and no outstanding change request.
    pub fn is_ready_to_merge(&self) -> bool {
        self.checks_failed == 0
            && self.checks_pending == 0
            && self.approved > 0
            && self.changes_requested == 0
    }
}

/// A hosting-platform issue. Same shape as a [`Ticket`] but with
/// hosting-native fields (integer number, labels, milestone, project node
/// IDs) in place of the tracker's custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub assignees: BTreeSet<String>,
    pub labels: BTreeSet<String>,
    pub milestone: Option<String>,
    /// Opaque project-v2 node IDs the issue is currently attached to.
    pub projects: Vec<String>,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// State filter for listing issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
    All,
}

/// Fields that may be set on issue creation or update. `None` means
/// "leave unchanged"; distinguishing "unset" from "clear to empty" is why
/// `labels`/`assignees` are `Option<Vec<_>>` rather than bare `Vec<_>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFields {
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    pub assignees: Option<Vec<String>>,
    pub labels: Option<Vec<String>>,
    pub milestone: Option<String>,
    pub projects: Option<Vec<String>>,
}

/// Fields that may be set when creating or updating a PR.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrFields {
    pub title: Option<String>,
    pub body: Option<String>,
    pub base: Option<String>,
    pub draft: Option<bool>,
}

/// Status of a single CI job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Running,
    Pending,
    Cancelled,
}

/// A job within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiJob {
    pub name: String,
    pub number: u64,
    pub status: JobStatus,
}

/// A workflow within a pipeline, with its constituent jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiWorkflow {
    pub name: String,
    pub id: String,
    pub status: JobStatus,
    pub jobs: Vec<CiJob>,
}

/// Metadata about a single failed test extracted from a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTest {
    pub name: String,
    pub class_name: Option<String>,
    pub file: Option<String>,
    pub message: Option<String>,
}

/// A job that failed, with whatever failed-test metadata could be
/// extracted from its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub workflow_name: String,
    pub job_name: String,
    pub job_number: u64,
    pub failed_tests: Vec<FailedTest>,
}

/// Aggregated CI status for a branch, per spec §4.6: pipeline → workflows
/// → jobs, with failed jobs flattened into a separate list for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiStatus {
    pub branch: String,
    pub project_slug: String,
    pub pipeline_number: u64,
    pub workflows: Vec<CiWorkflow>,
    pub failed_jobs: Vec<FailedJob>,
}

impl CiStatus {
    pub fn total_failed_jobs(&self) -> usize {
        self.failed_jobs.len()
    }

    pub fn all_green(&self) -> bool {
        self.failed_jobs.is_empty()
            && self
                .workflows
                .iter()
                .all(|w| matches!(w.status, JobStatus::Success))
    }
}

/// Output of `GetBuildDetails`: concatenated step output for a single
/// failed build, fetched via the CI provider's older v1.1 API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDetail {
    pub build_number: u64,
    pub steps: Vec<BuildStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub name: String,
    pub status: JobStatus,
    pub output: Option<String>,
}

/// Selection policy for the hosting client's dual backend, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingMode {
    Direct,
    Subprocess,
    #[default]
    Auto,
}

impl HostingMode {
    /// Parse the `VIBE_GITHUB_MODE` env var / `github.mode` config value.
    /// Unrecognized input yields `None` rather than silently defaulting.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Some(HostingMode::Direct),
            "subprocess" => Some(HostingMode::Subprocess),
            "auto" => Some(HostingMode::Auto),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_as_text_collapses_list() {
        let v = FieldValue::List(vec![
            FieldValue::Text("a".into()),
            FieldValue::Text("b".into()),
        ]);
        assert_eq!(v.as_text(), Some("a, b".to_string()));
    }

    #[test]
    fn field_value_null_is_missing() {
        assert_eq!(FieldValue::Null.as_text(), None);
        assert_eq!(FieldValue::Text(String::new()).as_text(), None);
    }

    #[test]
    fn ticket_custom_field_roundtrip() {
        let mut ticket = sample_ticket();
        ticket
            .custom_fields
            .insert("sprint".into(), FieldValue::Text("Sprint 12".into()));
        assert_eq!(ticket.custom_field("sprint"), Some("Sprint 12".to_string()));
        assert_eq!(ticket.custom_field("missing"), None);
    }

    #[test]
    fn pr_status_keeps_latest_verdict_per_reviewer() {
        let reviews = vec![
            ("alice".to_string(), ReviewVerdict::Commented),
            ("alice".to_string(), ReviewVerdict::Approved),
            ("bob".to_string(), ReviewVerdict::ChangesRequested),
        ];
        // Iteration order here represents "most recent first"; only the
        // first entry per reviewer should be kept.
        let status = PrStatus::from_reviews_and_checks(reviews, vec![]);
        assert_eq!(status.commented, 1);
        assert_eq!(status.approved, 0);
        assert_eq!(status.changes_requested, 1);
    }

    #[test]
    fn pr_status_ready_requires_approval_and_no_blockers() {
        let mut status = PrStatus::default();
        assert!(!status.is_ready_to_merge());

        status.approved = 1;
        assert!(status.is_ready_to_merge());

        status.checks_failed = 1;
        assert!(!status.is_ready_to_merge());

        status.checks_failed = 0;
        status.changes_requested = 1;
        assert!(!status.is_ready_to_merge());
    }

    #[test]
    fn ci_status_all_green_requires_no_failed_jobs_and_success_workflows() {
        let mut status = sample_ci_status();
        assert!(status.all_green());

        status.failed_jobs.push(FailedJob {
            workflow_name: "build".into(),
            job_name: "test".into(),
            job_number: 1,
            failed_tests: vec![],
        });
        assert!(!status.all_green());
    }

    fn sample_ticket() -> Ticket {
        Ticket {
            id: "abc123xyz".into(),
            title: "Fix login bug".into(),
            description: String::new(),
            status: "backlog".into(),
            assignees: BTreeSet::new(),
            url: "https://example.com/t/abc123xyz".into(),
            custom_fields: BTreeMap::new(),
            comments: vec![],
        }
    }

    fn sample_ci_status() -> CiStatus {
        CiStatus {
            branch: "feature/x".into(),
            project_slug: "gh/acme/widgets".into(),
            pipeline_number: 42,
            workflows: vec![CiWorkflow {
                name: "build".into(),
                id: "wf1".into(),
                status: JobStatus::Success,
                jobs: vec![],
            }],
            failed_jobs: vec![],
        }
    }
}
