//! Repository-coordinate fallback (spec §4.1, "Repository-coordinate
//! fallback").
//!
//! A client is configured with an `owner`/`repo` pair in config, but
//! that pair can go stale (a rename, a fork, a typo) while the working
//! tree's `origin` remote still points at the right place. Rather than
//! fail outright, retry once against a client rebuilt from the remote
//! URL.

use regex::Regex;
use std::sync::OnceLock;

use vibe_types::VibeError;

use crate::HostingClient;

/// Parsed `owner/repo` coordinate from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinate {
    pub owner: String,
    pub repo: String,
}

fn ssh_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^git@[^:]+:([^/]+)/(.+?)(\.git)?$").unwrap())
}

fn https_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https://[^/]+/([^/]+)/(.+?)(\.git)?/?$").unwrap())
}

/// Parse a git remote URL (SSH `git@host:owner/repo(.git)?` or HTTPS
/// `https://host/owner/repo(.git)?`) into its owner/repo coordinate.
pub fn parse_remote_url(url: &str) -> Option<RepoCoordinate> {
    let url = url.trim();
    let caps = ssh_re().captures(url).or_else(|| https_re().captures(url))?;
    let owner = caps.get(1)?.as_str();
    let repo = caps.get(2)?.as_str();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(RepoCoordinate {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Run `call` against `client`; if it fails with
/// [`VibeError::is_repository_not_found`], parse `origin_remote_url`,
/// rebuild a client with `rebuild`, and retry once. The fallback
/// detects by error-category identity, never by matching message text.
pub fn with_repo_fallback<C, T, F, R>(
    client: &C,
    origin_remote_url: Option<&str>,
    call: F,
    rebuild: R,
) -> Result<T, VibeError>
where
    C: HostingClient,
    F: Fn(&C) -> Result<T, VibeError>,
    R: FnOnce(&str, &str) -> Result<C, VibeError>,
{
    match call(client) {
        Ok(value) => Ok(value),
        Err(err) if err.is_repository_not_found() => {
            let Some(remote_url) = origin_remote_url else {
                return Err(err);
            };
            let Some(coordinate) = parse_remote_url(remote_url) else {
                return Err(err);
            };
            let (current_owner, current_repo) = client.owner_repo();
            if coordinate.owner == current_owner && coordinate.repo == current_repo {
                return Err(err);
            }
            let fallback_client = rebuild(&coordinate.owner, &coordinate.repo)?;
            call(&fallback_client)
        }
        Err(err) => Err(err),
    }
}
