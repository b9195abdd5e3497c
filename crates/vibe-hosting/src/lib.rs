//! Dual-backend hosting-platform client (spec §4.1).
//!
//! [`HostingClient`] is the single contract both backends implement. The
//! `Direct` backend talks to the hosting REST API and a GraphQL endpoint
//! over HTTPS; the `Subprocess` backend shells out to the hosting
//! platform's own CLI and parses its JSON output. `HostingMode::Auto`
//! probes once and materialises to one of the two (see
//! [`select_backend`]). [`with_repo_fallback`] wraps any contract call
//! and retries once against a repository parsed from the working tree's
//! `origin` remote when the configured coordinate doesn't resolve.

pub mod direct;
pub mod fallback;
pub mod subprocess;

use vibe_types::{Issue, IssueFields, IssueState, PrFields, PrStatus, PullRequest, VibeError};

/// The capability set both backends implement (spec §4.1, "Contract").
/// Every call takes and returns `Result<_, VibeError>` rather than a
/// generic error so `with_repo_fallback` and the retry layer can branch
/// on category identity.
pub trait HostingClient {
    fn create_pr(&self, fields: &PrFields, head: &str) -> Result<PullRequest, VibeError>;
    fn get_pr(&self, number: u64) -> Result<PullRequest, VibeError>;
    fn update_pr(&self, number: u64, fields: &PrFields) -> Result<PullRequest, VibeError>;
    fn get_pr_status(&self, number: u64) -> Result<PrStatus, VibeError>;
    fn list_prs(&self, head: Option<&str>) -> Result<Vec<PullRequest>, VibeError>;
    fn add_comment(&self, pr_number: u64, body: &str) -> Result<(), VibeError>;
    fn get_pr_template(&self) -> Result<Option<String>, VibeError>;

    fn create_issue(&self, fields: &IssueFields) -> Result<Issue, VibeError>;
    fn get_issue(&self, number: u64, include_comments: bool) -> Result<Issue, VibeError>;
    fn update_issue(&self, number: u64, fields: &IssueFields) -> Result<Issue, VibeError>;
    fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>, VibeError>;
    fn get_issue_template(&self) -> Result<Option<String>, VibeError>;

    /// `(owner, repo)` this client instance is bound to — needed by
    /// `with_repo_fallback` to construct a rebound retry client.
    fn owner_repo(&self) -> (&str, &str);
}

pub use direct::DirectClient;
pub use fallback::with_repo_fallback;
pub use subprocess::SubprocessClient;

/// Candidate hosting CLI templates try, most specific first (spec §4.4,
/// "PR creation": "try several casings").
pub const PR_TEMPLATE_PATHS: &[&str] = &[
    ".github/pull_request_template.md",
    ".github/PULL_REQUEST_TEMPLATE.md",
    "PULL_REQUEST_TEMPLATE.md",
    "docs/pull_request_template.md",
];

pub const ISSUE_TEMPLATE_PATHS: &[&str] = &[
    ".github/ISSUE_TEMPLATE.md",
    ".github/issue_template.md",
    "ISSUE_TEMPLATE.md",
];

/// Resolve which backend to build for `mode` (spec §4.1, "Selection
/// policy"): `auto` probes the CLI's auth-status subcommand once; if it
/// succeeds, subprocess; else if a token is configured, direct; else an
/// actionable error naming both remedies.
pub fn select_backend(
    mode: vibe_types::HostingMode,
    cli_binary: &str,
    token: Option<&str>,
) -> Result<ResolvedBackend, VibeError> {
    match mode {
        vibe_types::HostingMode::Direct => Ok(ResolvedBackend::Direct),
        vibe_types::HostingMode::Subprocess => Ok(ResolvedBackend::Subprocess),
        vibe_types::HostingMode::Auto => {
            if probe_cli_auth(cli_binary) {
                Ok(ResolvedBackend::Subprocess)
            } else if token.is_some() {
                Ok(ResolvedBackend::Direct)
            } else {
                Err(VibeError::configuration(
                    "github.mode",
                    "auto",
                    &format!(
                        "run `{cli_binary} auth login` to use the subprocess backend, \
                         or set GITHUB_TOKEN / github.token to use the direct backend"
                    ),
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBackend {
    Direct,
    Subprocess,
}

fn probe_cli_auth(cli_binary: &str) -> bool {
    if !vibe_process::command_exists(cli_binary) {
        return false;
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    vibe_process::run_command_with_timeout(
        cli_binary,
        &["auth", "status"],
        &cwd,
        Some(std::time::Duration::from_secs(10)),
    )
    .map(|output| output.success())
    .unwrap_or(false)
}
