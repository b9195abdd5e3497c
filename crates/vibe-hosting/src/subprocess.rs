//! Subprocess backend (spec §4.1, "Subprocess backend").
//!
//! Wraps the hosting platform's own CLI, parsing its `--json` output.
//! Authentication is delegated entirely to the CLI's own stored
//! credentials — this backend never sees a token. Field updates are
//! additive where the CLI itself is additive (labels, assignees); a
//! caller that wants replace-semantics needs the direct backend.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use vibe_process::{needs_stdin, run_with_stdin, OUTPUT_TRUNCATION_LIMIT};
use vibe_types::{Issue, IssueFields, IssueState, NotFoundKind, PartialFailure, PrFields, PrStatus, PullRequest, VibeError};

use crate::HostingClient;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct SubprocessClient {
    cli_binary: String,
    working_dir: PathBuf,
    owner: String,
    repo: String,
    timeout: Duration,
}

impl SubprocessClient {
    pub fn new(cli_binary: impl Into<String>, working_dir: impl AsRef<Path>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            cli_binary: cli_binary.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            owner: owner.into(),
            repo: repo.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn repo_flag(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Run the CLI with `args`, piping `stdin_body` through stdin when
    /// it's long or multiline (spec §4.1) rather than passing it as an
    /// argv element, and parse its stdout as JSON.
    fn run_json<T: serde::de::DeserializeOwned>(
        &self,
        args: &[&str],
        stdin_body: Option<&str>,
    ) -> Result<T, VibeError> {
        let output = run_with_stdin(&self.cli_binary, args, &self.working_dir, stdin_body, Some(self.timeout))
            .map_err(VibeError::Other)?;

        if output.timed_out {
            return Err(VibeError::Timeout(self.timeout));
        }
        if !output.success() {
            return Err(classify_cli_failure(&output.stderr, output.combined_truncated(OUTPUT_TRUNCATION_LIMIT), self.repo_flag().as_str()));
        }

        serde_json::from_str(&output.stdout).map_err(|e| VibeError::Other(anyhow::anyhow!("failed to parse {} JSON: {e}", self.cli_binary)))
    }

    fn run_stdin_args<'a>(&self, body: &'a str, base_args: Vec<&'a str>) -> (Vec<&'a str>, Option<&'a str>) {
        if needs_stdin(body) {
            let mut args = base_args;
            args.push("--body-file");
            args.push("-");
            (args, Some(body))
        } else {
            let mut args = base_args;
            args.push("--body");
            args.push(body);
            (args, None)
        }
    }

    /// `gh issue edit <number> --add-project <name>`, one invocation per
    /// project since the CLI only accepts one `--add-project` value per
    /// call. Mirrors `DirectClient::attach_projects` (spec §4.1, end-to-end
    /// scenario 5): a project that fails to attach doesn't fail the whole
    /// issue creation, it's reported back as a partial failure alongside
    /// whichever projects did attach.
    fn attach_projects(&self, issue_number: u64, project_refs: &[String]) -> Result<(), VibeError> {
        if project_refs.is_empty() {
            return Ok(());
        }

        let number_str = issue_number.to_string();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for project_ref in project_refs {
            let args = [
                "issue", "edit", number_str.as_str(), "--repo", self.repo_flag().as_str(), "--add-project", project_ref.as_str(),
            ];
            let outcome = run_with_stdin(&self.cli_binary, &args, &self.working_dir, None, Some(self.timeout))
                .map_err(VibeError::Other)
                .and_then(|output| {
                    if output.timed_out {
                        return Err(VibeError::Timeout(self.timeout));
                    }
                    if !output.success() {
                        return Err(classify_cli_failure(&output.stderr, output.combined_truncated(OUTPUT_TRUNCATION_LIMIT), self.repo_flag().as_str()));
                    }
                    Ok(())
                });
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
}

fn classify_cli_failure(stderr: &str, detail: String, repo_flag: &str) -> VibeError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("could not resolve") || lower.contains("repository not found") || lower.contains("gh: not found") {
        VibeError::repository_not_found(repo_flag)
    } else if lower.contains("not found") {
        VibeError::not_found(NotFoundKind::Other, detail)
    } else if lower.contains("authentication") || lower.contains("not logged in") || lower.contains("unauthorized") {
        VibeError::Authentication {
            service: "github".to_string(),
            token_source: "gh CLI credential store".to_string(),
        }
    } else if lower.contains("rate limit") || lower.contains("timeout") || lower.contains("connection") {
        VibeError::transient("gh cli invocation", detail)
    } else {
        VibeError::Other(anyhow::anyhow!(detail))
    }
}

impl HostingClient for SubprocessClient {
    fn create_pr(&self, fields: &PrFields, head: &str) -> Result<PullRequest, VibeError> {
        let title = fields.title.clone().unwrap_or_default();
        let base = fields.base.clone().unwrap_or_else(|| "main".to_string());
        let body = fields.body.clone().unwrap_or_default();

        let base_args = vec![
            "pr", "create", "--repo", self.repo_flag().as_str(), "--title", &title, "--base", &base, "--head", head,
        ];
        let (mut args, stdin) = self.run_stdin_args(&body, base_args);
        if fields.draft.unwrap_or(false) {
            args.push("--draft");
        }
        args.push("--json");
        args.push(PR_FIELDS);

        let wire: PrWire = self.run_json(&args, stdin)?;
        Ok(wire.into_pr())
    }

    fn get_pr(&self, number: u64) -> Result<PullRequest, VibeError> {
        let number_str = number.to_string();
        let wire: PrWire = self.run_json(
            &["pr", "view", number_str.as_str(), "--repo", self.repo_flag().as_str(), "--json", PR_FIELDS],
            None,
        )?;
        Ok(wire.into_pr())
    }

    fn update_pr(&self, number: u64, fields: &PrFields) -> Result<PullRequest, VibeError> {
        let number_str = number.to_string();
        let mut args = vec!["pr", "edit", number_str.as_str(), "--repo", self.repo_flag().as_str()];
        let title_owned;
        if let Some(title) = &fields.title {
            title_owned = title.clone();
            args.push("--title");
            args.push(&title_owned);
        }
        let base_owned;
        if let Some(base) = &fields.base {
            base_owned = base.clone();
            args.push("--base");
            args.push(&base_owned);
        }

        let body = fields.body.clone().unwrap_or_default();
        let stdin = if fields.body.is_some() {
            let (body_args, stdin) = self.run_stdin_args(&body, vec![]);
            args.extend(body_args);
            stdin
        } else {
            None
        };

        run_with_stdin(&self.cli_binary, &args, &self.working_dir, stdin, Some(self.timeout))
            .map_err(VibeError::Other)
            .and_then(|output| {
                if output.timed_out {
                    return Err(VibeError::Timeout(self.timeout));
                }
                if !output.success() {
                    return Err(classify_cli_failure(&output.stderr, output.combined_truncated(OUTPUT_TRUNCATION_LIMIT), self.repo_flag().as_str()));
                }
                Ok(())
            })?;

        self.get_pr(number)
    }

    fn get_pr_status(&self, number: u64) -> Result<PrStatus, VibeError> {
        let number_str = number.to_string();
        let wire: PrStatusWire = self.run_json(
            &["pr", "view", number_str.as_str(), "--repo", self.repo_flag().as_str(), "--json", "reviews,statusCheckRollup"],
            None,
        )?;
        Ok(wire.into_status())
    }

    fn list_prs(&self, head: Option<&str>) -> Result<Vec<PullRequest>, VibeError> {
        let mut args = vec!["pr", "list", "--repo", self.repo_flag().as_str(), "--json", PR_FIELDS];
        if let Some(head) = head {
            args.push("--head");
            args.push(head);
        }
        let wires: Vec<PrWire> = self.run_json(&args, None)?;
        Ok(wires.into_iter().map(PrWire::into_pr).collect())
    }

    fn add_comment(&self, pr_number: u64, body: &str) -> Result<(), VibeError> {
        let number_str = pr_number.to_string();
        let base_args = vec!["pr", "comment", number_str.as_str(), "--repo", self.repo_flag().as_str()];
        let (args, stdin) = self.run_stdin_args(body, base_args);

        let output = run_with_stdin(&self.cli_binary, &args, &self.working_dir, stdin, Some(self.timeout))
            .map_err(VibeError::Other)?;
        if output.timed_out {
            return Err(VibeError::Timeout(self.timeout));
        }
        if !output.success() {
            return Err(classify_cli_failure(&output.stderr, output.combined_truncated(OUTPUT_TRUNCATION_LIMIT), self.repo_flag().as_str()));
        }
        Ok(())
    }

    fn get_pr_template(&self) -> Result<Option<String>, VibeError> {
        fetch_template_via_api(self, crate::PR_TEMPLATE_PATHS)
    }

    fn create_issue(&self, fields: &IssueFields) -> Result<Issue, VibeError> {
        let title = fields.title.clone().unwrap_or_default();
        let body = fields.body.clone().unwrap_or_default();
        let base_args = vec!["issue", "create", "--repo", self.repo_flag().as_str(), "--title", &title];
        let (mut args, stdin) = self.run_stdin_args(&body, base_args);

        let labels_owned;
        if let Some(labels) = &fields.labels {
            labels_owned = labels.join(",");
            args.push("--label");
            args.push(&labels_owned);
        }
        let assignees_owned;
        if let Some(assignees) = &fields.assignees {
            assignees_owned = assignees.join(",");
            args.push("--assignee");
            args.push(&assignees_owned);
        }
        if let Some(milestone) = &fields.milestone {
            args.push("--milestone");
            args.push(milestone);
        }
        args.push("--json");
        args.push(ISSUE_FIELDS);

        let wire: IssueWire = self.run_json(&args, stdin)?;
        let issue = wire.into_issue();

        if let Some(projects) = &fields.projects {
            self.attach_projects(issue.number, projects)?;
        }

        Ok(Issue { projects: fields.projects.clone().unwrap_or_default(), ..issue })
    }

    fn get_issue(&self, number: u64, include_comments: bool) -> Result<Issue, VibeError> {
        let number_str = number.to_string();
        let fields = if include_comments {
            format!("{ISSUE_FIELDS},comments")
        } else {
            ISSUE_FIELDS.to_string()
        };
        let wire: IssueWire = self.run_json(
            &["issue", "view", number_str.as_str(), "--repo", self.repo_flag().as_str(), "--json", fields.as_str()],
            None,
        )?;
        Ok(wire.into_issue())
    }

    fn update_issue(&self, number: u64, fields: &IssueFields) -> Result<Issue, VibeError> {
        let number_str = number.to_string();
        let mut args = vec!["issue", "edit", number_str.as_str(), "--repo", self.repo_flag().as_str()];
        let title_owned;
        if let Some(title) = &fields.title {
            title_owned = title.clone();
            args.push("--title");
            args.push(&title_owned);
        }
        let labels_owned;
        if let Some(labels) = &fields.labels {
            labels_owned = labels.join(",");
            args.push("--add-label");
            args.push(&labels_owned);
        }
        let assignees_owned;
        if let Some(assignees) = &fields.assignees {
            assignees_owned = assignees.join(",");
            args.push("--add-assignee");
            args.push(&assignees_owned);
        }
        let milestone_owned;
        if let Some(milestone) = &fields.milestone {
            milestone_owned = milestone.clone();
            args.push("--milestone");
            args.push(&milestone_owned);
        }

        let body = fields.body.clone().unwrap_or_default();
        let stdin = if fields.body.is_some() {
            let (body_args, stdin) = self.run_stdin_args(&body, vec![]);
            args.extend(body_args);
            stdin
        } else {
            None
        };

        let output = run_with_stdin(&self.cli_binary, &args, &self.working_dir, stdin, Some(self.timeout))
            .map_err(VibeError::Other)?;
        if output.timed_out {
            return Err(VibeError::Timeout(self.timeout));
        }
        if !output.success() {
            return Err(classify_cli_failure(&output.stderr, output.combined_truncated(OUTPUT_TRUNCATION_LIMIT), self.repo_flag().as_str()));
        }

        self.get_issue(number, false)
    }

    fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>, VibeError> {
        let state_flag = match state {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        };
        let wires: Vec<IssueWire> = self.run_json(
            &["issue", "list", "--repo", self.repo_flag().as_str(), "--state", state_flag, "--json", ISSUE_FIELDS],
            None,
        )?;
        Ok(wires.into_iter().map(IssueWire::into_issue).collect())
    }

    fn get_issue_template(&self) -> Result<Option<String>, VibeError> {
        fetch_template_via_api(self, crate::ISSUE_TEMPLATE_PATHS)
    }

    fn owner_repo(&self) -> (&str, &str) {
        (&self.owner, &self.repo)
    }
}

const PR_FIELDS: &str = "number,title,body,state,isDraft,mergeable,headRefName,baseRefName,url,author,createdAt,updatedAt";
const ISSUE_FIELDS: &str = "number,title,body,state,assignees,labels,milestone,url,author,createdAt,updatedAt";

/// Fetch a template through the CLI's generic repository-content API,
/// which (like the direct backend's `/contents` endpoint) returns
/// base64-encoded content (spec §4.1).
fn fetch_template_via_api(client: &SubprocessClient, candidates: &[&str]) -> Result<Option<String>, VibeError> {
    for path in candidates {
        let endpoint = format!("repos/{}/contents/{path}", client.repo_flag());
        let result: Result<ContentWire, VibeError> = client.run_json(&["api", &endpoint], None);
        match result {
            Ok(wire) => {
                let cleaned: String = wire.content.chars().filter(|c| !c.is_whitespace()).collect();
                let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, cleaned)
                    .map_err(|e| VibeError::Other(anyhow::anyhow!("invalid base64 template content: {e}")))?;
                return Ok(Some(String::from_utf8_lossy(&decoded).to_string()));
            }
            Err(e) if matches!(e, VibeError::NotFound { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

#[derive(Debug, Deserialize)]
struct ContentWire {
    content: String,
}

#[derive(Debug, Deserialize)]
struct PrWire {
    number: u64,
    title: String,
    #[serde(default)]
    body: String,
    state: String,
    #[serde(rename = "isDraft")]
    is_draft: bool,
    #[serde(default)]
    mergeable: Option<String>,
    #[serde(rename = "headRefName")]
    head_ref_name: String,
    #[serde(rename = "baseRefName")]
    base_ref_name: String,
    url: String,
    author: AuthorWire,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

impl PrWire {
    fn into_pr(self) -> PullRequest {
        let state = match self.state.as_str() {
            "OPEN" => vibe_types::PrState::Open,
            "MERGED" => vibe_types::PrState::Merged,
            _ => vibe_types::PrState::Closed,
        };
        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body,
            state,
            draft: self.is_draft,
            mergeable: self.mergeable.map(|m| m == "MERGEABLE"),
            head: self.head_ref_name,
            base: self.base_ref_name,
            url: self.url,
            author: self.author.login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelWire {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MilestoneWire {
    title: String,
}

#[derive(Debug, Deserialize)]
struct IssueWire {
    number: u64,
    title: String,
    #[serde(default)]
    body: String,
    state: String,
    #[serde(default)]
    assignees: Vec<AuthorWire>,
    #[serde(default)]
    labels: Vec<LabelWire>,
    #[serde(default)]
    milestone: Option<MilestoneWire>,
    url: String,
    author: AuthorWire,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    comments: Vec<SubCommentWire>,
}

#[derive(Debug, Deserialize)]
struct SubCommentWire {
    author: AuthorWire,
    body: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

impl IssueWire {
    fn into_issue(self) -> Issue {
        Issue {
            number: self.number,
            title: self.title,
            body: self.body,
            state: self.state.to_lowercase(),
            assignees: self.assignees.into_iter().map(|a| a.login).collect::<BTreeSet<_>>(),
            labels: self.labels.into_iter().map(|l| l.name).collect::<BTreeSet<_>>(),
            milestone: self.milestone.map(|m| m.title),
            projects: Vec::new(),
            url: self.url,
            author: self.author.login,
            created_at: self.created_at,
            updated_at: self.updated_at,
            comments: self
                .comments
                .into_iter()
                .map(|c| vibe_types::Comment {
                    author: c.author.login,
                    body: c.body,
                    created_at: c.created_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrStatusWire {
    #[serde(default)]
    reviews: Vec<ReviewWire>,
    #[serde(default, rename = "statusCheckRollup")]
    status_check_rollup: Vec<CheckWire>,
}

#[derive(Debug, Deserialize)]
struct ReviewWire {
    author: AuthorWire,
    state: String,
}

#[derive(Debug, Deserialize)]
struct AuthorWire {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CheckWire {
    #[serde(default)]
    conclusion: Option<String>,
    status: String,
}

impl PrStatusWire {
    fn into_status(self) -> PrStatus {
        use vibe_types::{CheckOutcome, ReviewVerdict};

        let reviews_latest_first = self.reviews.into_iter().rev().map(|r| {
            let verdict = match r.state.as_str() {
                "APPROVED" => ReviewVerdict::Approved,
                "CHANGES_REQUESTED" => ReviewVerdict::ChangesRequested,
                "COMMENTED" => ReviewVerdict::Commented,
                _ => ReviewVerdict::Pending,
            };
            (r.author.login, verdict)
        });

        let checks = self.status_check_rollup.into_iter().map(|c| {
            if c.status != "COMPLETED" {
                CheckOutcome::Pending
            } else {
                match c.conclusion.as_deref() {
                    Some("SUCCESS") | Some("NEUTRAL") | Some("SKIPPED") => CheckOutcome::Passed,
                    _ => CheckOutcome::Failed,
                }
            }
        });

        PrStatus::from_reviews_and_checks(reviews_latest_first, checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_cli_failure_detects_repository_not_found() {
        let err = classify_cli_failure("GraphQL: Could not resolve to a Repository", "detail".into(), "acme/widgets");
        assert!(err.is_repository_not_found());
    }

    #[test]
    fn classify_cli_failure_detects_authentication() {
        let err = classify_cli_failure("gh: not logged in. Run `gh auth login`", "detail".into(), "acme/widgets");
        assert!(matches!(err, VibeError::Authentication { .. }));
    }

    #[test]
    fn classify_cli_failure_detects_rate_limit_as_transient() {
        let err = classify_cli_failure("API rate limit exceeded", "detail".into(), "acme/widgets");
        assert!(err.is_retryable());
    }

    #[test]
    fn classify_cli_failure_falls_back_to_other() {
        let err = classify_cli_failure("something unexpected happened", "detail".into(), "acme/widgets");
        assert!(matches!(err, VibeError::Other(_)));
    }

    #[test]
    fn pr_status_wire_converts_reviews_and_checks() {
        let wire = PrStatusWire {
            reviews: vec![ReviewWire {
                author: AuthorWire { login: "alice".into() },
                state: "APPROVED".into(),
            }],
            status_check_rollup: vec![CheckWire {
                conclusion: Some("SUCCESS".into()),
                status: "COMPLETED".into(),
            }],
        };
        let status = wire.into_status();
        assert_eq!(status.approved, 1);
        assert_eq!(status.checks_passed, 1);
        assert!(status.is_ready_to_merge());
    }

    #[test]
    fn run_stdin_args_chooses_body_file_for_multiline() {
        let client = SubprocessClient::new("gh", PathBuf::from("."), "acme", "widgets");
        let (args, stdin) = client.run_stdin_args("line one\nline two", vec!["pr", "create"]);
        assert!(args.contains(&"--body-file"));
        assert_eq!(stdin, Some("line one\nline two"));
    }

    #[test]
    fn run_stdin_args_passes_short_body_inline() {
        let client = SubprocessClient::new("gh", PathBuf::from("."), "acme", "widgets");
        let (args, stdin) = client.run_stdin_args("short", vec!["pr", "create"]);
        assert!(args.contains(&"--body"));
        assert!(stdin.is_none());
    }
}
