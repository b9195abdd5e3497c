//! `CommandContext` assembly (spec §2, §3 "Ownership").
//!
//! One context is built per command invocation and exclusively owns its
//! clients and working-copy handle for that invocation's lifetime. It is
//! not `Clone` and not shared across threads except where a module
//! explicitly borrows `&self` into a scoped fan-out (see `vibe-ci`).

use std::path::Path;

use vibe_ai::ClaudeClient;
use vibe_cache::Cache;
use vibe_ci::CiClient;
use vibe_config::Config;
use vibe_git::WorkingCopy;
use vibe_hosting::{fallback::parse_remote_url, DirectClient, HostingClient, SubprocessClient};
use vibe_tracker::{Folder, TrackerClient};
use vibe_types::VibeError;

/// The default hosting CLI `HostingMode::Auto` probes and the
/// subprocess backend shells out to. Not user-configurable per spec
/// §4.1 — only the *mode* is a config field, not the binary name.
pub const HOSTING_CLI_BINARY: &str = "gh";

/// A merged config plus every service client a command might touch,
/// built once and handed to whichever `workflow`/`issues`/`ci` function
/// the dispatched command calls into.
pub struct CommandContext {
    pub config: Config,
    pub tracker: TrackerClient,
    pub hosting: Box<dyn HostingClient>,
    pub ci: CiClient,
    pub ai: Option<ClaudeClient>,
    pub git: WorkingCopy,
    pub sprint_cache: Cache<Vec<Folder>>,
    /// The `origin` remote URL captured at construction, reused by
    /// `withRepoFallback` without re-reading the working tree.
    pub origin_remote_url: Option<String>,
    /// Which backend `hosting` is bound to, so a repo-coordinate
    /// fallback rebuilds the same kind of client rather than assuming
    /// direct (spec §4.1: both backends expose the same contract, so
    /// fallback must not silently change which one answers).
    backend: vibe_hosting::ResolvedBackend,
}

impl CommandContext {
    /// Build a context from an already-layered `config` against the
    /// working copy rooted at (or above) `repo_root`.
    pub fn new(config: Config, repo_root: &Path) -> Result<Self, VibeError> {
        config.validate_required()?;

        let git = WorkingCopy::open(repo_root).map_err(VibeError::Other)?;
        let origin_remote_url = git.origin_remote_url().map_err(VibeError::Other)?;

        let clickup_token = vibe_auth::resolve_token(vibe_auth::Service::ClickUp, non_empty(&config.clickup.api_token));
        let tracker = TrackerClient::new(vibe_tracker::DEFAULT_BASE_URL, clickup_token.token.unwrap_or_default());

        let (owner, repo) = resolve_repo_coordinate(&config, origin_remote_url.as_deref())?;
        let github_token = vibe_auth::resolve_token(vibe_auth::Service::GitHub, non_empty(&config.github.token));
        let backend = vibe_hosting::select_backend(config.github.mode, HOSTING_CLI_BINARY, github_token.token.as_deref())?;
        let hosting: Box<dyn HostingClient> = match backend {
            vibe_hosting::ResolvedBackend::Direct => Box::new(DirectClient::new(
                github_token.token.clone().unwrap_or_default(),
                owner.clone(),
                repo.clone(),
            )),
            vibe_hosting::ResolvedBackend::Subprocess => Box::new(SubprocessClient::new(
                HOSTING_CLI_BINARY,
                git.root_path().map_err(VibeError::Other)?,
                owner.clone(),
                repo.clone(),
            )),
        };

        let circleci_token = vibe_auth::resolve_token(vibe_auth::Service::CircleCi, non_empty(&config.circleci.api_token));
        let ci = CiClient::new(circleci_token.token.unwrap_or_default());

        let claude_token = vibe_auth::resolve_token(vibe_auth::Service::Claude, non_empty(&config.claude.api_key));
        let ai_enabled = config.ai.enabled.unwrap_or(true);
        let ai = if ai_enabled {
            claude_token.token.map(ClaudeClient::new)
        } else {
            None
        };

        Ok(Self {
            config,
            tracker,
            hosting,
            ci,
            ai,
            git,
            sprint_cache: Cache::new(),
            origin_remote_url,
            backend,
        })
    }

    /// Run `call` with `withRepoFallback` wrapped around it (spec §4.1),
    /// rebuilding a direct-backend client against the `origin`-derived
    /// repository on a "repository not found" failure. Only meaningful
    /// for the direct backend; the subprocess backend resolves the repo
    /// from the local checkout already, so it never hits this path.
    pub fn with_repo_fallback<T>(
        &self,
        call: impl Fn(&dyn HostingClient) -> Result<T, VibeError>,
    ) -> Result<T, VibeError> {
        match call(self.hosting.as_ref()) {
            Ok(value) => Ok(value),
            Err(err) if err.is_repository_not_found() => {
                let Some(remote_url) = self.origin_remote_url.as_deref() else {
                    return Err(err);
                };
                let Some(coordinate) = parse_remote_url(remote_url) else {
                    return Err(err);
                };
                let (current_owner, current_repo) = self.hosting.owner_repo();
                if coordinate.owner == current_owner && coordinate.repo == current_repo {
                    return Err(err);
                }
                let fallback: Box<dyn HostingClient> = match self.backend {
                    vibe_hosting::ResolvedBackend::Direct => {
                        let github_token =
                            vibe_auth::resolve_token(vibe_auth::Service::GitHub, non_empty(&self.config.github.token));
                        Box::new(DirectClient::new(
                            github_token.token.unwrap_or_default(),
                            coordinate.owner,
                            coordinate.repo,
                        ))
                    }
                    vibe_hosting::ResolvedBackend::Subprocess => {
                        let root = self.git.root_path().map_err(VibeError::Other)?;
                        Box::new(SubprocessClient::new(HOSTING_CLI_BINARY, root, coordinate.owner, coordinate.repo))
                    }
                };
                call(fallback.as_ref())
            }
            Err(err) => Err(err),
        }
    }

    /// The hosting username used as the branch-prefix fallback (spec
    /// §4.4: "if prefix is blank, substitute username").
    pub fn username(&self) -> &str {
        &self.config.github.username
    }

    pub fn branch_prefix(&self) -> &str {
        &self.config.git.branch_prefix
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Resolve the (owner, repo) coordinate a hosting client binds to:
/// configured values win; otherwise fall back to parsing `origin`.
fn resolve_repo_coordinate(config: &Config, origin_remote_url: Option<&str>) -> Result<(String, String), VibeError> {
    if !config.github.owner.is_empty() && !config.github.repo.is_empty() {
        return Ok((config.github.owner.clone(), config.github.repo.clone()));
    }
    let remote_url = origin_remote_url.ok_or_else(|| {
        VibeError::configuration(
            "config",
            "github.owner/github.repo",
            "set github.owner and github.repo, or run from a directory with an origin remote",
        )
    })?;
    let coordinate = parse_remote_url(remote_url).ok_or_else(|| {
        VibeError::configuration(
            "config",
            "github.owner/github.repo",
            "origin remote URL could not be parsed as owner/repo; set github.owner and github.repo explicitly",
        )
    })?;
    Ok((coordinate.owner, coordinate.repo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_repo_coordinate_prefers_config() {
        let mut config = Config::new();
        config.github.owner = "acme".to_string();
        config.github.repo = "widgets".to_string();
        let (owner, repo) = resolve_repo_coordinate(&config, Some("git@github.com:other/ignored.git")).unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn resolve_repo_coordinate_falls_back_to_origin() {
        let config = Config::new();
        let (owner, repo) = resolve_repo_coordinate(&config, Some("https://github.com/acme/widgets.git")).unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn resolve_repo_coordinate_errors_without_either() {
        let config = Config::new();
        let err = resolve_repo_coordinate(&config, None).unwrap_err();
        assert!(matches!(err, VibeError::Configuration { .. }));
    }
}
