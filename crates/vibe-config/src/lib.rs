//! Layered YAML configuration for vibe (spec §4.3).
//!
//! Five tiers are deep-merged in strictly increasing priority: built-in
//! defaults, the global file, a local override found by walking up from
//! the working directory, environment variables, then CLI flags. A
//! field counts as "not set" when it's empty/zero, so a local override
//! file only needs to list what it changes — this is why almost every
//! field below is a bare `String`/`Vec`/`u64` rather than `Option<T>`:
//! the empty value already means absent. `ai.enabled` and
//! `ai.generate_descriptions` are the one place `false` is a meaningful
//! override rather than "unset", so those two stay `Option<bool>`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vibe_types::{HostingMode, VibeError};

/// Local override filenames, most-preferred first. Both are accepted at
/// every directory level while walking up (spec §4.3 names both); `vibe`
/// resolves `.vibe.yaml` first to match the dotfile convention used for
/// other per-project overrides.
pub const LOCAL_CONFIG_NAMES: &[&str] = &[".vibe.yaml", "vibe.yaml"];

/// Directory name under the platform config dir for the global file.
pub const GLOBAL_CONFIG_SUBDIR: &str = "vibe";
pub const GLOBAL_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClickUpConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub team_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub mode: HostingMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitConfig {
    #[serde(default)]
    pub branch_prefix: String,
    #[serde(default)]
    pub base_branch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CircleCiConfig {
    #[serde(default)]
    pub api_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClaudeConfig {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub sprint_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub generate_descriptions: Option<bool>,
}

/// The fully merged configuration. Every field starts from `Default`
/// (the built-in defaults tier) and is overridden tier by tier via
/// [`Config::merge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub clickup: ClickUpConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub circleci: CircleCiConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub debug: bool,
}

fn merge_string(base: &mut String, other: &str) {
    if !other.is_empty() {
        *base = other.to_string();
    }
}

fn merge_vec<T: Clone>(base: &mut Vec<T>, other: &[T]) {
    if !other.is_empty() {
        *base = other.to_vec();
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-merge `other` onto `self`, `other` taking priority field by
    /// field. Empty strings, empty vecs, and `0`/default mode in `other`
    /// are treated as "not set" and leave `self`'s value untouched.
    pub fn merge(&self, other: &Config) -> Config {
        let mut merged = self.clone();

        merge_string(&mut merged.clickup.api_token, &other.clickup.api_token);
        merge_string(&mut merged.clickup.user_id, &other.clickup.user_id);
        merge_string(&mut merged.clickup.workspace_id, &other.clickup.workspace_id);
        merge_string(&mut merged.clickup.team_id, &other.clickup.team_id);

        merge_string(&mut merged.github.token, &other.github.token);
        merge_string(&mut merged.github.username, &other.github.username);
        merge_string(&mut merged.github.owner, &other.github.owner);
        merge_string(&mut merged.github.repo, &other.github.repo);
        if other.github.mode != HostingMode::default() {
            merged.github.mode = other.github.mode;
        }

        merge_string(&mut merged.git.branch_prefix, &other.git.branch_prefix);
        merge_string(&mut merged.git.base_branch, &other.git.base_branch);

        merge_string(&mut merged.circleci.api_token, &other.circleci.api_token);
        merge_string(&mut merged.claude.api_key, &other.claude.api_key);

        merge_vec(&mut merged.workspaces, &other.workspaces);

        merge_string(&mut merged.defaults.status, &other.defaults.status);

        if other.ai.enabled.is_some() {
            merged.ai.enabled = other.ai.enabled;
        }
        if other.ai.generate_descriptions.is_some() {
            merged.ai.generate_descriptions = other.ai.generate_descriptions;
        }

        merged.debug = merged.debug || other.debug;

        merged
    }

    /// Required blocks (spec §4.3): `clickup`, `github`, `git`, at least
    /// one workspace. Not run automatically by [`load`]; `CommandContext::new`
    /// calls this once the layered config is final, before any client is
    /// built, so a missing token or workspace fails fast with a
    /// `Configuration` error instead of surfacing as a confusing 401 deep
    /// in a client call.
    pub fn validate_required(&self) -> Result<(), VibeError> {
        if self.clickup.api_token.is_empty() {
            return Err(VibeError::configuration(
                "config",
                "clickup.api_token",
                "set CLICKUP_API_TOKEN or clickup.api_token in vibe.yaml",
            ));
        }
        if self.github.token.is_empty() && self.github.mode != HostingMode::Subprocess {
            return Err(VibeError::configuration(
                "config",
                "github.token",
                "set GITHUB_TOKEN or github.token in vibe.yaml",
            ));
        }
        if self.git.base_branch.is_empty() {
            return Err(VibeError::configuration(
                "config",
                "git.base_branch",
                "set git.base_branch in vibe.yaml",
            ));
        }
        if self.workspaces.is_empty() {
            return Err(VibeError::configuration(
                "config",
                "workspaces",
                "configure at least one entry under workspaces[] in vibe.yaml",
            ));
        }
        Ok(())
    }

    /// Overlay the four secret-bearing env vars and the two `VIBE_*`
    /// toggles (spec §4.3 item 4). Takes priority over file tiers, is
    /// itself overridden by CLI flags.
    pub fn apply_env(&self) -> Config {
        let mut merged = self.clone();
        if let Ok(v) = std::env::var("CLICKUP_API_TOKEN") {
            merge_string(&mut merged.clickup.api_token, &v);
        }
        if let Ok(v) = std::env::var("GITHUB_TOKEN") {
            merge_string(&mut merged.github.token, &v);
        }
        if let Ok(v) = std::env::var("CIRCLECI_TOKEN") {
            merge_string(&mut merged.circleci.api_token, &v);
        }
        if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
            merge_string(&mut merged.claude.api_key, &v);
        }
        if let Ok(v) = std::env::var("VIBE_GITHUB_MODE") {
            if let Some(mode) = HostingMode::parse(&v) {
                merged.github.mode = mode;
            }
        }
        if let Ok(v) = std::env::var("VIBE_DEBUG") {
            merged.debug = merged.debug || v == "1" || v.eq_ignore_ascii_case("true");
        }
        merged
    }
}

/// Deserialize a YAML config fragment from `content`.
pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    Ok(serde_yaml::from_str(content)?)
}

/// Load and parse a config file; a missing file yields `Config::default()`.
pub fn load_config_file(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// `<user-config-dir>/vibe/config.yaml` (spec §4.3, tier 2).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_SUBDIR).join(GLOBAL_CONFIG_FILE))
}

/// Walk up from `start_dir` looking for a local override file, trying
/// [`LOCAL_CONFIG_NAMES`] in order at each level (spec §4.3, tier 3).
pub fn find_local_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;
    loop {
        for name in LOCAL_CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Run all five tiers: defaults → global file → local file → env →
/// `cli_overrides` (a `Config` fragment the caller built from parsed CLI
/// flags, empty fields meaning "flag not given").
pub fn load(start_dir: &Path, cli_overrides: &Config) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        warn_if_permissions_too_loose(&global_path);
        config = config.merge(&load_config_file(&global_path)?);
    }

    if let Some(local_path) = find_local_config(start_dir) {
        warn_if_permissions_too_loose(&local_path);
        config = config.merge(&load_config_file(&local_path)?);
    }

    config = config.apply_env();
    config = config.merge(cli_overrides);

    Ok(config)
}

/// Config files must be created `0600`; warn (do not fail) if a reader
/// finds looser permissions (spec §4.3).
#[cfg(unix)]
fn warn_if_permissions_too_loose(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            eprintln!(
                "warning: {} has permissions {:o}, expected 0600 or stricter",
                path.display(),
                mode
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_permissions_too_loose(_path: &Path) {}

/// Write `config` to `path` as YAML, setting `0600` on unix.
pub fn save_config(path: &Path, config: &Config) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml)?;
    set_owner_only_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn merge_treats_empty_as_unset() {
        let mut base = Config::default();
        base.clickup.api_token = "base-token".to_string();
        base.git.base_branch = "main".to_string();

        let override_cfg = Config::default(); // everything empty

        let merged = base.merge(&override_cfg);
        assert_eq!(merged.clickup.api_token, "base-token");
        assert_eq!(merged.git.base_branch, "main");
    }

    #[test]
    fn merge_lets_nonempty_fields_override() {
        let mut base = Config::default();
        base.clickup.api_token = "base-token".to_string();

        let mut override_cfg = Config::default();
        override_cfg.clickup.api_token = "override-token".to_string();

        let merged = base.merge(&override_cfg);
        assert_eq!(merged.clickup.api_token, "override-token");
    }

    #[test]
    fn ai_enabled_false_is_a_real_override_not_unset() {
        let mut base = Config::default();
        base.ai.enabled = Some(true);

        let mut override_cfg = Config::default();
        override_cfg.ai.enabled = Some(false);

        let merged = base.merge(&override_cfg);
        assert_eq!(merged.ai.enabled, Some(false));
    }

    #[test]
    fn validate_required_fails_on_missing_workspace() {
        let mut config = Config::default();
        config.clickup.api_token = "t".to_string();
        config.github.token = "t".to_string();
        config.git.base_branch = "main".to_string();

        assert!(config.validate_required().is_err());

        config.workspaces.push(WorkspaceConfig {
            name: "eng".to_string(),
            folder_id: "123".to_string(),
            sprint_patterns: vec![],
        });
        assert!(config.validate_required().is_ok());
    }

    #[test]
    fn validate_required_allows_missing_token_in_subprocess_mode() {
        let mut config = Config::default();
        config.clickup.api_token = "t".to_string();
        config.git.base_branch = "main".to_string();
        config.github.mode = HostingMode::Subprocess;
        config.workspaces.push(WorkspaceConfig::default());

        assert!(config.validate_required().is_ok());
    }

    #[test]
    fn find_local_config_walks_up_and_prefers_dotfile() {
        let td = tempdir().expect("tempdir");
        let nested = td.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        std::fs::write(td.path().join("vibe.yaml"), "git:\n  base_branch: main\n").unwrap();
        std::fs::write(td.path().join(".vibe.yaml"), "git:\n  base_branch: develop\n").unwrap();

        let found = find_local_config(&nested).expect("found");
        assert_eq!(found, td.path().join(".vibe.yaml"));
    }

    #[test]
    fn load_config_file_missing_yields_default() {
        let td = tempdir().expect("tempdir");
        let config = load_config_file(&td.path().join("missing.yaml")).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parse_config_reads_workspaces_and_sprint_patterns() {
        let yaml = r#"
clickup:
  api_token: tok
github:
  owner: RithyHuot
  repo: vibe
  mode: direct
git:
  base_branch: main
workspaces:
  - name: eng
    folder_id: "123"
    sprint_patterns:
      - "Sprint.*"
"#;
        let config = parse_config(yaml).expect("parse");
        assert_eq!(config.github.owner, "RithyHuot");
        assert_eq!(config.workspaces.len(), 1);
        assert_eq!(config.workspaces[0].sprint_patterns, vec!["Sprint.*".to_string()]);
    }

    #[test]
    fn apply_env_overlays_tokens_and_debug_flag() {
        temp_env::with_vars(
            [
                ("CLICKUP_API_TOKEN", Some("env-token")),
                ("VIBE_DEBUG", Some("true")),
            ],
            || {
                let config = Config::default().apply_env();
                assert_eq!(config.clickup.api_token, "env-token");
                assert!(config.debug);
            },
        );
    }
}
