use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the per-workspace override file.
pub const PROJECT_CONFIG_FILE: &str = ".promptsync";

/// Status of config file loading
#[derive(Debug, Clone)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

/// Which reconciliation steps are enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Apply `.github/copilot-instructions.md` (and allow the language step).
    pub enable_workspace_prompts: bool,
    /// Apply `.vscode/copilot.json`.
    pub enable_language_specific: bool,
    /// Register `.github/prompts` as a prompt-file source.
    pub enable_prompt_files: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            enable_workspace_prompts: true,
            enable_language_specific: true,
            enable_prompt_files: true,
        }
    }
}

/// Host editor integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Settings file, relative to the workspace root unless absolute.
    pub settings_file: String,
    /// Milliseconds between the two toggle invocations when reloading Copilot.
    pub reload_pause_ms: u64,
    /// Host action name → command line that performs it.
    pub actions: BTreeMap<String, Vec<String>>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            settings_file: ".vscode/settings.json".to_string(),
            reload_pause_ms: 1000,
            actions: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Expand `~` to home directory in a path string
    pub fn expand_tilde(path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    /// Get the settings file path for a workspace root
    pub fn settings_path(&self, root: &Path) -> PathBuf {
        let expanded = Self::expand_tilde(&self.host.settings_file);
        if expanded.is_absolute() {
            expanded
        } else {
            root.join(expanded)
        }
    }

    pub fn reload_pause(&self) -> Duration {
        Duration::from_millis(self.host.reload_pause_ms)
    }
}

/// Partial workspace configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialWorkspaceConfig {
    pub enable_workspace_prompts: Option<bool>,
    pub enable_language_specific: Option<bool>,
    pub enable_prompt_files: Option<bool>,
}

/// Partial host configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialHostConfig {
    pub settings_file: Option<String>,
    pub reload_pause_ms: Option<u64>,
    pub actions: Option<BTreeMap<String, Vec<String>>>,
}

/// Partial logging configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialLoggingConfig {
    pub level: Option<String>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.promptsync` files. Fields that are `None` inherit from the global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub workspace: PartialWorkspaceConfig,
    pub host: PartialHostConfig,
    pub logging: PartialLoggingConfig,
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    Config {
        workspace: WorkspaceConfig {
            enable_workspace_prompts: project
                .workspace
                .enable_workspace_prompts
                .unwrap_or(global.workspace.enable_workspace_prompts),
            enable_language_specific: project
                .workspace
                .enable_language_specific
                .unwrap_or(global.workspace.enable_language_specific),
            enable_prompt_files: project
                .workspace
                .enable_prompt_files
                .unwrap_or(global.workspace.enable_prompt_files),
        },
        host: HostConfig {
            settings_file: project
                .host
                .settings_file
                .clone()
                .unwrap_or_else(|| global.host.settings_file.clone()),
            reload_pause_ms: project
                .host
                .reload_pause_ms
                .unwrap_or(global.host.reload_pause_ms),
            actions: project
                .host
                .actions
                .clone()
                .unwrap_or_else(|| global.host.actions.clone()),
        },
        logging: LoggingConfig {
            level: project
                .logging
                .level
                .clone()
                .unwrap_or_else(|| global.logging.level.clone()),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "promptsync", "promptsync")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.promptsync in the workspace root).
pub fn get_project_config_path(root: &Path) -> Option<PathBuf> {
    let path = root.join(PROJECT_CONFIG_FILE);
    if path.exists() { Some(path) } else { None }
}

/// Load a project config (.promptsync) from the given path.
/// Returns Ok(PartialConfig) on success, Err(String) on parse/read failure.
fn load_project_config(path: &Path) -> Result<PartialConfig, String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_read_failed");
        format!("Failed to read {}: {}", PROJECT_CONFIG_FILE, e)
    })?;

    toml::from_str::<PartialConfig>(&contents).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_parse_failed");
        format!("Invalid {}: {}", PROJECT_CONFIG_FILE, e)
    })
}

/// Load configuration from file, environment, and defaults.
///
/// `root` is the workspace whose `.promptsync` overrides the global file.
pub fn load_config(root: Option<&Path>) -> LoadedConfig {
    let (config, config_path, status) = match get_config_path() {
        Some(path) => {
            debug!(path = ?path, "config_path_resolved");
            let (config, status) = load_or_create_config(&path);
            (config, path, status)
        }
        None => {
            warn!("config_dir_unavailable");
            (
                Config::default(),
                PathBuf::from("config.toml"),
                ConfigLoadStatus::Error("No config directory on this system".to_string()),
            )
        }
    };

    let (config, project_config_path) = apply_project_config(config, root);

    LoadedConfig {
        config: apply_env_overrides(config),
        config_path,
        project_config_path,
        status,
    }
}

/// Merge the workspace's `.promptsync` over `config`, if there is one.
fn apply_project_config(config: Config, root: Option<&Path>) -> (Config, Option<PathBuf>) {
    let Some(project_path) = root.and_then(get_project_config_path) else {
        return (config, None);
    };

    match load_project_config(&project_path) {
        Ok(partial) => {
            info!(path = ?project_path, "project_config_loaded");
            (merge_config(&config, &partial), Some(project_path))
        }
        Err(e) => {
            warn!(path = ?project_path, error = %e, "project_config_error");
            (config, Some(project_path))
        }
    }
}

/// Read the global config file, writing the defaults on first run.
///
/// Any failure falls back to `Config::default()`; the status carries the reason.
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return create_default_config(config_path);
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_read_failed");
            let reason = format!("Cannot read {}: {}", config_path.display(), e);
            return (Config::default(), ConfigLoadStatus::Error(reason));
        }
    };

    match toml::from_str::<Config>(&contents) {
        Ok(config) => {
            info!(path = ?config_path, "config_loaded");
            (config, ConfigLoadStatus::Loaded)
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_malformed");
            let reason = format!("Malformed {}: {}", config_path.display(), e);
            (Config::default(), ConfigLoadStatus::Error(reason))
        }
    }
}

/// Write `Config::default()` to `config_path`. The defaults are used either way.
fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();
    match write_config(&config, config_path) {
        Ok(()) => {
            info!(path = ?config_path, "default_config_created");
            (config, ConfigLoadStatus::Created)
        }
        Err(e) => {
            warn!(path = ?config_path, error = %format!("{:#}", e), "default_config_write_failed");
            (config, ConfigLoadStatus::Error(format!("{:#}", e)))
        }
    }
}

fn write_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// `PROMPTSYNC_LOG` and `PROMPTSYNC_SETTINGS_FILE` win over both config files.
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(level) = env::var("PROMPTSYNC_LOG") {
        debug!(level = %level, "log_level_from_env");
        config.logging.level = level;
    }
    if let Ok(path) = env::var("PROMPTSYNC_SETTINGS_FILE") {
        debug!(path = %path, "settings_file_from_env");
        config.host.settings_file = path;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.workspace.enable_workspace_prompts);
        assert!(config.workspace.enable_language_specific);
        assert!(config.workspace.enable_prompt_files);
        assert_eq!(config.host.settings_file, ".vscode/settings.json");
        assert_eq!(config.host.reload_pause_ms, 1000);
        assert!(config.host.actions.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = Config::expand_tilde("~/.config/test");
        assert!(!expanded.to_string_lossy().starts_with('~'));

        let no_tilde = Config::expand_tilde("/absolute/path");
        assert_eq!(no_tilde, PathBuf::from("/absolute/path"));

        let relative = Config::expand_tilde("./relative/path");
        assert_eq!(relative, PathBuf::from("./relative/path"));
    }

    #[test]
    fn test_settings_path_relative_to_root() {
        let config = Config::default();
        assert_eq!(
            config.settings_path(Path::new("/ws")),
            PathBuf::from("/ws/.vscode/settings.json")
        );
    }

    #[test]
    fn test_settings_path_absolute() {
        let mut config = Config::default();
        config.host.settings_file = "/etc/settings.json".to_string();
        assert_eq!(
            config.settings_path(Path::new("/ws")),
            PathBuf::from("/etc/settings.json")
        );
    }

    #[test]
    fn test_reload_pause() {
        let mut config = Config::default();
        config.host.reload_pause_ms = 250;
        assert_eq!(config.reload_pause(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
[workspace]
enable_workspace_prompts = false
enable_prompt_files = false

[host]
settings_file = "custom/settings.json"
reload_pause_ms = 10

[host.actions]
"github.copilot.reload" = ["code", "--reuse-window"]

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.workspace.enable_workspace_prompts);
        assert!(config.workspace.enable_language_specific);
        assert!(!config.workspace.enable_prompt_files);
        assert_eq!(config.host.settings_file, "custom/settings.json");
        assert_eq!(config.host.reload_pause_ms, 10);
        assert_eq!(
            config.host.actions.get("github.copilot.reload"),
            Some(&vec!["code".to_string(), "--reuse-window".to_string()])
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_partial_deserialization() {
        let toml_str = r#"
[logging]
level = "warn"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.workspace, WorkspaceConfig::default());
        assert_eq!(config.host, HostConfig::default());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let toml_str = r#"
[workspace]
enable_prompt_files = false
unknown_key = "should be ignored"

[unknown_section]
foo = "bar"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.workspace.enable_prompt_files);
    }

    #[test]
    fn test_default_config_serializes_and_reloads() {
        let toml_content = toml::to_string_pretty(&Config::default()).unwrap();
        let config: Config = toml::from_str(&toml_content).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_empty() {
        let partial: PartialConfig = toml::from_str("").unwrap();
        assert!(partial.workspace.enable_workspace_prompts.is_none());
        assert!(partial.workspace.enable_language_specific.is_none());
        assert!(partial.workspace.enable_prompt_files.is_none());
        assert!(partial.host.settings_file.is_none());
        assert!(partial.host.reload_pause_ms.is_none());
        assert!(partial.host.actions.is_none());
        assert!(partial.logging.level.is_none());
    }

    #[test]
    fn test_partial_config_comment_only() {
        let toml_str = "# Workspace overrides for promptsync\n";
        let partial: PartialConfig = toml::from_str(toml_str).unwrap();
        assert!(partial.workspace.enable_prompt_files.is_none());
        assert!(partial.logging.level.is_none());
    }

    #[test]
    fn test_merge_config_no_overrides() {
        let global = Config::default();
        let merged = merge_config(&global, &PartialConfig::default());
        assert_eq!(merged, global);
    }

    #[test]
    fn test_merge_config_partial_overrides() {
        let mut global = Config::default();
        global
            .host
            .actions
            .insert("github.copilot.reload".to_string(), vec!["true".to_string()]);

        let partial: PartialConfig = toml::from_str(
            r#"
[workspace]
enable_language_specific = false

[host]
reload_pause_ms = 0
"#,
        )
        .unwrap();
        let merged = merge_config(&global, &partial);

        // Overridden fields
        assert!(!merged.workspace.enable_language_specific);
        assert_eq!(merged.host.reload_pause_ms, 0);

        // Inherited fields
        assert!(merged.workspace.enable_workspace_prompts);
        assert!(merged.workspace.enable_prompt_files);
        assert_eq!(merged.host.settings_file, global.host.settings_file);
        assert_eq!(merged.host.actions, global.host.actions);
        assert_eq!(merged.logging.level, global.logging.level);
    }

    #[test]
    fn test_merge_config_actions_replace_whole_table() {
        let mut global = Config::default();
        global
            .host
            .actions
            .insert("a".to_string(), vec!["true".to_string()]);

        let partial: PartialConfig = toml::from_str(
            r#"
[host.actions]
b = ["false"]
"#,
        )
        .unwrap();
        let merged = merge_config(&global, &partial);

        assert!(!merged.host.actions.contains_key("a"));
        assert!(merged.host.actions.contains_key("b"));
    }

    #[test]
    fn test_apply_project_config_from_root() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[workspace]\nenable_prompt_files = false\n",
        )
        .unwrap();

        let (config, path) = apply_project_config(Config::default(), Some(dir.path()));

        assert!(!config.workspace.enable_prompt_files);
        assert_eq!(path, Some(dir.path().join(PROJECT_CONFIG_FILE)));
    }

    #[test]
    fn test_apply_project_config_malformed_keeps_global() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROJECT_CONFIG_FILE), "[workspace\n").unwrap();

        let (config, _) = apply_project_config(Config::default(), Some(dir.path()));

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_apply_project_config_without_root() {
        let (config, path) = apply_project_config(Config::default(), None);
        assert_eq!(config, Config::default());
        assert!(path.is_none());
    }

    #[test]
    fn test_create_default_config_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let (config, status) = create_default_config(&path);

        assert_eq!(config, Config::default());
        assert!(matches!(status, ConfigLoadStatus::Created));
        let (reloaded, status) = load_or_create_config(&path);
        assert_eq!(reloaded, Config::default());
        assert!(matches!(status, ConfigLoadStatus::Loaded));
    }

    #[test]
    fn test_malformed_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[logging\nlevel = ").unwrap();

        let (config, status) = load_or_create_config(&path);

        assert_eq!(config, Config::default());
        assert!(matches!(status, ConfigLoadStatus::Error(_)));
    }
}
