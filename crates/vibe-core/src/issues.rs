//! Issue display, creation, and update (spec §6: `issues`, `issue`,
//! `issue-create`, `issue-update`).

use vibe_types::{Issue, IssueFields, IssueState, VibeError};

use crate::confirm::Confirm;
use crate::context::CommandContext;

/// `issues --state --limit` (`--select` is a terminal-layer concern,
/// left to the caller).
pub fn list_issues(ctx: &CommandContext, state: IssueState, limit: Option<usize>) -> Result<Vec<Issue>, VibeError> {
    let mut issues = ctx.with_repo_fallback(|h| h.list_issues(state))?;
    if let Some(limit) = limit {
        issues.truncate(limit);
    }
    Ok(issues)
}

/// `issue [number] --comments`.
pub fn get_issue(ctx: &CommandContext, number: u64, include_comments: bool) -> Result<Issue, VibeError> {
    ctx.with_repo_fallback(|h| h.get_issue(number, include_comments))
}

/// `issue-create` (spec §4.4 via the hosting contract, end-to-end
/// scenario 5). If `fields.body` is unset, falls back to the repo's
/// issue template verbatim — unlike PR bodies, issue bodies aren't
/// section-filled, so the template is used as-is.
///
/// A `VibeError::Partial` here means the issue itself was created on
/// the hosting platform (the REST call that creates it already
/// succeeded); only some of the requested project attachments failed.
/// The caller sees the full success/failure split and can reattach the
/// failed ones by hand — this function does not retry.
pub fn create_issue(ctx: &CommandContext, confirm: &dyn Confirm, mut fields: IssueFields, yes: bool) -> Result<Issue, VibeError> {
    if fields.body.is_none() {
        fields.body = ctx.with_repo_fallback(|h| h.get_issue_template())?;
    }

    if !yes && !confirm.confirm("Create this issue?") {
        return Err(VibeError::Cancelled("issue creation declined at confirmation".to_string()));
    }

    ctx.with_repo_fallback(|h| h.create_issue(&fields))
}

/// `issue-update <number>` (end-to-end scenario 3: direct mode replaces
/// the label set exactly; subprocess mode unions with the existing set —
/// that distinction lives in the two `HostingClient` implementations,
/// not here).
pub fn update_issue(ctx: &CommandContext, number: u64, fields: &IssueFields) -> Result<Issue, VibeError> {
    ctx.with_repo_fallback(|h| h.update_issue(number, fields))
}
