//! CI status aggregation and single-build detail display (spec §4.6,
//! §6: `ci-status`, `ci-failure`).

use vibe_types::{BuildDetail, CiStatus, VibeError};

use crate::context::CommandContext;

/// `ci-status [branch]`. `branch` defaults to the working copy's current
/// branch when not given.
pub fn ci_status(ctx: &CommandContext, branch: Option<&str>) -> Result<CiStatus, VibeError> {
    let branch = resolve_branch(ctx, branch)?;
    let project_slug = project_slug(ctx)?;
    ctx.ci.get_status(&project_slug, &branch)
}

/// `ci-failure [job-number] --branch`. `job_number` selects the build
/// number to inspect; when absent, the most recent failed job on
/// `branch` (or the current branch) is used.
pub fn ci_failure(ctx: &CommandContext, branch: Option<&str>, job_number: Option<u64>) -> Result<BuildDetail, VibeError> {
    let branch = resolve_branch(ctx, branch)?;
    let project_slug = project_slug(ctx)?;

    let build_number = match job_number {
        Some(number) => number,
        None => {
            let status = ctx.ci.get_status(&project_slug, &branch)?;
            status
                .failed_jobs
                .first()
                .map(|job| job.job_number)
                .ok_or_else(|| VibeError::not_found(vibe_types::NotFoundKind::Other, format!("no failed jobs on branch '{branch}'")))?
        }
    };

    ctx.ci.get_build_details(&project_slug, build_number)
}

fn resolve_branch(ctx: &CommandContext, branch: Option<&str>) -> Result<String, VibeError> {
    match branch {
        Some(branch) => Ok(branch.to_string()),
        None => ctx
            .git
            .current_branch()
            .map_err(VibeError::Other)?
            .ok_or_else(|| VibeError::validation("branch", "", "detached HEAD has no branch to check CI status for")),
    }
}

fn project_slug(ctx: &CommandContext) -> Result<String, VibeError> {
    let remote_url = ctx.origin_remote_url.as_deref().ok_or_else(|| {
        VibeError::configuration("git", "origin", "no origin remote configured; cannot derive a CI project slug")
    })?;
    vibe_ci::CiClient::project_slug(remote_url)
}
