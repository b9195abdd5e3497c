//! Ticket-to-branch, PR create/update/status, and merge trigger (spec
//! §4.4).

use vibe_ai::AiClient;
use vibe_types::{NotFoundKind, PrFields, PullRequest, Ticket, VibeError};
use vibe_validate::{extract_ticket_id, generate_branch_name, is_ticket_id, validate_branch_name};

use crate::confirm::{Confirm, StashDecision};
use crate::context::CommandContext;
use crate::template::{compose_pr_body, SectionValues};

/// What `workon` did, for the caller to report.
pub struct WorkonOutcome {
    pub ticket: Ticket,
    pub branch: String,
    pub created: bool,
    pub status_transitioned: bool,
}

/// `workon <ticket-id>` (spec §4.4, end-to-end scenario 1).
pub fn workon(ctx: &CommandContext, confirm: &dyn Confirm, ticket_id: &str) -> Result<WorkonOutcome, VibeError> {
    if !is_ticket_id(ticket_id) {
        return Err(VibeError::validation("ticket_id", ticket_id, "must be exactly 9 characters from [a-z0-9]"));
    }

    let ticket = ctx.tracker.get_task(ticket_id)?;
    let branch = generate_branch_name(ctx.branch_prefix(), ticket_id, &ticket.title, ctx.username());
    validate_branch_name(&branch)
        .map_err(|reason| VibeError::validation("branch", branch.as_str(), reason))?;

    let already_exists = ctx.git.branch_exists(&branch).map_err(VibeError::Other)?;

    handle_uncommitted_change_transition(ctx, confirm)?;

    if already_exists {
        ctx.git.checkout(&branch).map_err(VibeError::Other)?;
    } else {
        ctx.git.create_branch(&branch).map_err(VibeError::Other)?;
        ctx.git.checkout(&branch).map_err(VibeError::Other)?;
    }

    let target_status = ctx.config.defaults.status.as_str();
    let status_transitioned = if target_status.is_empty() || ticket.status == target_status {
        false
    } else {
        let fields = vibe_tracker::UpdateFields {
            status: Some(target_status.to_string()),
            ..Default::default()
        };
        // Non-fatal: the branch already exists regardless of whether the
        // tracker accepts the transition.
        ctx.tracker.update_task(ticket_id, &fields).is_ok()
    };

    Ok(WorkonOutcome {
        ticket,
        branch,
        created: !already_exists,
        status_transitioned,
    })
}

/// `branch [ticket-id]`: same fetch/checkout/create dance as `workon`,
/// minus the tracker status transition (spec §6: "Create branch without
/// tracker" — the ticket is still read for its title, only the write
/// back to the tracker is skipped).
pub fn branch_only(ctx: &CommandContext, confirm: &dyn Confirm, ticket_id: &str) -> Result<String, VibeError> {
    if !is_ticket_id(ticket_id) {
        return Err(VibeError::validation("ticket_id", ticket_id, "must be exactly 9 characters from [a-z0-9]"));
    }

    let ticket = ctx.tracker.get_task(ticket_id)?;
    let branch = generate_branch_name(ctx.branch_prefix(), ticket_id, &ticket.title, ctx.username());
    validate_branch_name(&branch)
        .map_err(|reason| VibeError::validation("branch", branch.as_str(), reason))?;

    handle_uncommitted_change_transition(ctx, confirm)?;

    if ctx.git.branch_exists(&branch).map_err(VibeError::Other)? {
        ctx.git.checkout(&branch).map_err(VibeError::Other)?;
    } else {
        ctx.git.create_branch(&branch).map_err(VibeError::Other)?;
        ctx.git.checkout(&branch).map_err(VibeError::Other)?;
    }

    Ok(branch)
}

/// Recover the ticket ID a branch was created for, per `extract_ticket_id`.
pub fn ticket_id_for_branch(branch: &str) -> Option<String> {
    extract_ticket_id(branch)
}

/// `ticket [ticket-id]`: with no ID given, recover one from the current
/// branch name.
pub fn get_ticket(ctx: &CommandContext, ticket_id: Option<&str>) -> Result<Ticket, VibeError> {
    let ticket_id = match ticket_id {
        Some(id) => id.to_string(),
        None => {
            let branch = ctx.git.current_branch().map_err(VibeError::Other)?;
            branch
                .as_deref()
                .and_then(extract_ticket_id)
                .ok_or_else(|| VibeError::validation("ticket_id", "", "no ticket ID given and none could be recovered from the current branch"))?
        }
    };
    ctx.tracker.get_task(&ticket_id)
}

/// `comment <text...>`: add a comment to a ticket, defaulting to the one
/// recovered from the current branch.
pub fn add_comment(ctx: &CommandContext, ticket_id: Option<&str>, text: &str) -> Result<String, VibeError> {
    let ticket_id = match ticket_id {
        Some(id) => id.to_string(),
        None => {
            let branch = ctx.git.current_branch().map_err(VibeError::Other)?;
            branch
                .as_deref()
                .and_then(extract_ticket_id)
                .ok_or_else(|| VibeError::validation("ticket_id", "", "no ticket ID given and none could be recovered from the current branch"))?
        }
    };
    ctx.tracker.add_comment(&ticket_id, text)?;
    Ok(ticket_id)
}

/// `start [ticket-id-or-search]`: a 9-char argument is resolved directly;
/// anything else is a tracker search, returning candidates for the
/// caller to present (interactive selection is a terminal-layer concern,
/// spec §1 Non-goals — the core only returns candidates).
pub fn search_candidates(ctx: &CommandContext, term: &str) -> Result<Vec<Ticket>, VibeError> {
    ctx.tracker.search_team_tasks(&ctx.config.clickup.team_id, term)
}

/// The uncommitted-change transition (spec §4.5). Must run, and either
/// stash-or-cancel cleanly, before any branch state changes.
fn handle_uncommitted_change_transition(ctx: &CommandContext, confirm: &dyn Confirm) -> Result<(), VibeError> {
    let status = ctx.git.status().map_err(VibeError::Other)?;
    let counts = vibe_git::summarize(&status);
    if !counts.has_tracked_changes() {
        return Ok(());
    }

    let message = format!(
        "{} modified, {} added, {} deleted file(s) are uncommitted. Stash them?",
        counts.modified, counts.added, counts.deleted
    );
    match confirm.stash_or_cancel(&message) {
        StashDecision::Stash => ctx.git.stash_push("vibe").map_err(VibeError::Other),
        StashDecision::Cancel => Err(VibeError::Cancelled("uncommitted changes; user declined to stash".to_string())),
    }
}

/// Options accepted by `pr` (spec §6's `pr` flag set).
#[derive(Debug, Clone, Default)]
pub struct PrCreateOptions {
    pub title: Option<String>,
    pub body: Option<String>,
    pub sections: SectionValues,
    pub draft: bool,
    pub base: Option<String>,
    pub yes: bool,
    pub ai: bool,
    pub ticket_url: Option<String>,
}

/// The branches a PR is never created from (spec §4.4 safety invariant).
const PROTECTED_HEADS: &[&str] = &["main", "master"];

/// `pr` (spec §4.4 "PR creation", end-to-end scenario 2).
pub fn create_pr(
    ctx: &CommandContext,
    confirm: &dyn Confirm,
    opts: PrCreateOptions,
    present_for_confirmation: impl FnOnce(&str),
) -> Result<PullRequest, VibeError> {
    let head = ctx
        .git
        .current_branch()
        .map_err(VibeError::Other)?
        .ok_or_else(|| VibeError::validation("branch", "", "detached HEAD has no branch to open a PR from"))?;

    if PROTECTED_HEADS.contains(&head.as_str()) {
        return Err(VibeError::validation("branch", head.as_str(), "refusing to open a PR from main or master"));
    }

    let existing = ctx.with_repo_fallback(|h| h.list_prs(Some(&head)))?;
    if let Some(pr) = existing.into_iter().next() {
        return Ok(pr);
    }

    let base = opts.base.clone().unwrap_or_else(|| {
        if ctx.config.git.base_branch.is_empty() {
            "main".to_string()
        } else {
            ctx.config.git.base_branch.clone()
        }
    });

    let body = if let Some(body) = opts.body.clone() {
        body
    } else {
        let template = ctx.with_repo_fallback(|h| h.get_pr_template())?;
        let mut sections = opts.sections.clone();
        if opts.ai {
            if let Some(ai) = &ctx.ai {
                if sections.description.is_none() {
                    let diff = ctx.git.diff(&head, &base).map_err(VibeError::Other)?;
                    let title = opts.title.as_deref().unwrap_or(&head);
                    let prompt = format!(
                        "Write a concise pull request description for this change.\n\nTitle: {title}\n\nDiff:\n{diff}"
                    );
                    if let Ok(generated) = ai.generate(&prompt) {
                        sections.description = Some(generated);
                    }
                }
            }
        }
        compose_pr_body(template.as_deref(), &sections, opts.ticket_url.as_deref())
    };

    if !opts.yes {
        present_for_confirmation(&body);
        if !confirm.confirm("Create this pull request?") {
            return Err(VibeError::Cancelled("PR creation declined at confirmation".to_string()));
        }
    }

    ctx.git.push("origin", &head).map_err(VibeError::Other)?;

    let fields = PrFields {
        title: opts.title,
        body: Some(body),
        base: Some(base),
        draft: Some(opts.draft),
    };

    ctx.with_repo_fallback(|h| h.create_pr(&fields, &head))
}

/// `pr-update [pr-number]` (spec §4.4 "PR update").
pub fn update_pr(
    ctx: &CommandContext,
    pr_number: Option<u64>,
    sections: &SectionValues,
    title: Option<String>,
) -> Result<PullRequest, VibeError> {
    let number = resolve_pr_number(ctx, pr_number)?;
    let current = ctx.with_repo_fallback(|h| h.get_pr(number))?;

    let mut body = current.body.clone();
    for section in crate::template::Section::all() {
        let value = match section {
            crate::template::Section::Summary => sections.summary.as_deref(),
            crate::template::Section::Description => sections.description.as_deref(),
            crate::template::Section::Testing => sections.testing.as_deref(),
        };
        if let Some(value) = value {
            body = crate::template::replace_section(&body, section, value)?;
        }
    }

    let fields = PrFields {
        title,
        body: Some(body),
        base: None,
        draft: None,
    };

    ctx.with_repo_fallback(|h| h.update_pr(number, &fields))
}

/// `pr-status [pr-number]` (spec §4.4 "PR status display").
pub fn pr_status(ctx: &CommandContext, pr_number: Option<u64>) -> Result<(PullRequest, vibe_types::PrStatus), VibeError> {
    let number = resolve_pr_number(ctx, pr_number)?;
    let pr = ctx.with_repo_fallback(|h| h.get_pr(number))?;
    let status = ctx.with_repo_fallback(|h| h.get_pr_status(number))?;
    Ok((pr, status))
}

/// `merge [pr-number]` (spec §4.4 "Merge trigger").
pub fn merge(ctx: &CommandContext, confirm: &dyn Confirm, pr_number: Option<u64>) -> Result<(), VibeError> {
    let number = resolve_pr_number(ctx, pr_number)?;
    let status = ctx.with_repo_fallback(|h| h.get_pr_status(number))?;
    if !status.is_ready_to_merge() {
        return Err(VibeError::Conflict(format!(
            "PR #{number} is not ready to merge: {} approvals, {} changes requested, {} checks failing",
            status.approved, status.changes_requested, status.checks_failed
        )));
    }

    if !confirm.confirm(&format!("Merge PR #{number}?")) {
        return Err(VibeError::Cancelled("merge declined at confirmation".to_string()));
    }

    ctx.with_repo_fallback(|h| h.add_comment(number, "/merge"))
}

/// Resolve an optional PR number: if absent, look up the PR open for the
/// current branch.
fn resolve_pr_number(ctx: &CommandContext, pr_number: Option<u64>) -> Result<u64, VibeError> {
    if let Some(number) = pr_number {
        return Ok(number);
    }
    let head = ctx.git.current_branch().map_err(VibeError::Other)?;
    let head = head.ok_or_else(|| VibeError::validation("branch", "", "detached HEAD has no associated PR"))?;
    let matches = ctx.with_repo_fallback(|h| h.list_prs(Some(&head)))?;
    matches
        .into_iter()
        .next()
        .map(|pr| pr.number)
        .ok_or_else(|| VibeError::not_found(NotFoundKind::PullRequest, format!("no open PR for branch '{head}'")))
}
