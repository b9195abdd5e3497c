//! Sprint-folder resolution (spec §4.7, GLOSSARY "Sprint folder"): the
//! one lookup the core caches.

use regex::Regex;
use vibe_config::WorkspaceConfig;
use vibe_tracker::Folder;
use vibe_types::VibeError;

use crate::context::CommandContext;

/// Pick the configured workspace to resolve sprints against. With a
/// name given, match it exactly; with none given, there must be exactly
/// one workspace configured (spec §9 Open Question: "workspaces required
/// only for commands that resolve sprints" — ambiguity with more than
/// one is a configuration error, not a silent first-match).
fn select_workspace<'a>(workspaces: &'a [WorkspaceConfig], workspace_name: Option<&str>) -> Result<&'a WorkspaceConfig, VibeError> {
    match workspace_name {
        Some(name) => workspaces.iter().find(|w| w.name == name).ok_or_else(|| {
            VibeError::configuration("config", "workspaces", format!("no workspace named '{name}' is configured"))
        }),
        None => match workspaces {
            [one] => Ok(one),
            [] => Err(VibeError::configuration(
                "config",
                "workspaces",
                "at least one workspace must be configured to resolve a sprint",
            )),
            _ => Err(VibeError::configuration(
                "config",
                "workspaces",
                "more than one workspace is configured; pass a workspace name to disambiguate",
            )),
        },
    }
}

/// Resolve the task-tracker folder whose name matches one of the
/// workspace's `sprint_patterns`, caching the folder listing for the
/// configured TTL (spec §4.7).
pub fn resolve_sprint_folder(ctx: &CommandContext, workspace_name: Option<&str>) -> Result<Folder, VibeError> {
    let workspace = select_workspace(&ctx.config.workspaces, workspace_name)?;

    let cache_key = vibe_cache::sprint_cache_key(&workspace.sprint_patterns);
    let folders = match ctx.sprint_cache.get(&cache_key) {
        Some(folders) => folders,
        None => {
            let fetched = ctx.tracker.get_folders(&workspace.folder_id)?;
            ctx.sprint_cache.set(cache_key, fetched.clone(), vibe_cache::SPRINT_FOLDER_TTL);
            fetched
        }
    };

    let patterns: Vec<Regex> = workspace
        .sprint_patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect();

    folders
        .into_iter()
        .find(|folder| patterns.iter().any(|re| re.is_match(&folder.name)))
        .ok_or_else(|| {
            VibeError::not_found(
                vibe_types::NotFoundKind::Other,
                format!("no folder in workspace '{}' matches the configured sprint patterns", workspace.name),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(name: &str, patterns: &[&str]) -> WorkspaceConfig {
        WorkspaceConfig {
            name: name.to_string(),
            folder_id: "folder-1".to_string(),
            sprint_patterns: patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn select_workspace_errors_on_ambiguity() {
        let workspaces = vec![workspace("a", &[]), workspace("b", &[])];
        let err = select_workspace(&workspaces, None).unwrap_err();
        assert!(matches!(err, VibeError::Configuration { .. }));
    }

    #[test]
    fn select_workspace_picks_sole_entry_when_unnamed() {
        let workspaces = vec![workspace("a", &[])];
        let selected = select_workspace(&workspaces, None).unwrap();
        assert_eq!(selected.name, "a");
    }

    #[test]
    fn select_workspace_errors_on_unknown_name() {
        let workspaces = vec![workspace("a", &[])];
        let err = select_workspace(&workspaces, Some("missing")).unwrap_err();
        assert!(matches!(err, VibeError::Configuration { .. }));
    }
}
