use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;

use super::dirs;
use super::env_var::EnvVars;

/// Top-level configuration for commitflow.
#[derive(Debug, Default, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Repository backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Three-way merge settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Commit message and committer settings.
    #[serde(default)]
    pub commit: CommitConfig,

    /// Auto-created branch naming.
    #[serde(default)]
    pub naming: NamingConfig,

    /// Log output settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Which backend talks to the repository host.
#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted REST API, called directly.
    #[default]
    Direct,
    /// Server-side git gateway.
    Gateway,
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend kind (default: "direct").
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL of the hosted REST API (default: "https://api.github.com").
    #[serde(default = "default_api_url")]
    #[schemars(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the git gateway. Required when kind is "gateway".
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Whether denied writes may be retried on a fork (default: true).
    #[serde(default = "default_true")]
    #[schemars(default = "default_true")]
    pub can_fork: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            api_url: default_api_url(),
            gateway_url: None,
            can_fork: default_true(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// URL of the three-way merge service.
    #[serde(default = "default_merge_service_url")]
    #[schemars(default = "default_merge_service_url")]
    pub service_url: String,

    /// Commit a clean merge without asking (default: false).
    #[serde(default)]
    pub auto_commit_clean: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            service_url: default_merge_service_url(),
            auto_commit_clean: false,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommitConfig {
    /// Message used when the commit message is left empty.
    #[serde(default = "default_commit_message")]
    #[schemars(default = "default_commit_message")]
    pub default_message: String,

    /// Title of pull requests opened after committing on a fork.
    #[serde(default = "default_pull_request_title")]
    #[schemars(default = "default_pull_request_title")]
    pub pull_request_title: String,

    /// Committer name sent to the gateway (default: "commitflow").
    #[serde(default = "default_committer_name")]
    #[schemars(default = "default_committer_name")]
    pub committer_name: String,

    /// Committer email sent to the gateway.
    #[serde(default)]
    pub committer_email: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            default_message: default_commit_message(),
            pull_request_title: default_pull_request_title(),
            committer_name: default_committer_name(),
            committer_email: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NamingConfig {
    /// Label inserted in auto-created branch names (default: "cf").
    #[serde(default = "default_label")]
    #[schemars(default = "default_label")]
    pub label: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
        }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Also write logs to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Emit logs as JSON lines (default: false).
    #[serde(default)]
    pub json: bool,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_merge_service_url() -> String {
    "http://localhost:8080/merge".to_string()
}

fn default_commit_message() -> String {
    "Edited with commitflow".to_string()
}

fn default_pull_request_title() -> String {
    "Changes from commitflow".to_string()
}

fn default_committer_name() -> String {
    "commitflow".to_string()
}

fn default_label() -> String {
    "cf".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read config file (permission error, etc.)
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML parse error
    #[error("Invalid config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("backend.kind is \"gateway\" but backend.gateway_url is not set")]
    MissingGatewayUrl,
}

/// Load configuration from $COMMITFLOW_CONFIG_DIR or ~/.config/commitflow/config.ya?ml.
/// Returns Config::default() if no config file exists.
pub fn load_config() -> anyhow::Result<Config> {
    match config_search_dir() {
        Some(dir) => load_config_from_dir(&dir),
        None => Ok(Config::default()),
    }
}

/// Directory searched for the config file, if one can be determined.
pub fn config_search_dir() -> Option<PathBuf> {
    if let Some(dir) = EnvVars::load().config_dir {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|dir| dir.join("commitflow"))
}

/// The config file that `load_config_from_dir` would read, if any.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    ["config.yaml", "config.yml"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load configuration from a specific directory.
/// Searches for config.yaml, then config.yml in the given directory.
/// Returns Config::default() if neither file exists.
pub fn load_config_from_dir(dir: &Path) -> anyhow::Result<Config> {
    for filename in &["config.yaml", "config.yml"] {
        let path = dir.join(filename);
        match std::fs::read_to_string(&path) {
            Ok(content) => return parse_config(&content, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ConfigError::ReadError { path, source: e }.into()),
        }
    }

    Ok(Config::default())
}

/// Parse YAML content into Config.
fn parse_config(content: &str, path: &Path) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if config.backend.kind == BackendKind::Gateway && config.backend.gateway_url.is_none() {
        return Err(ConfigError::MissingGatewayUrl.into());
    }
    Ok(config)
}

/// Generate JSON Schema for the Config struct.
pub fn generate_schema() -> schemars::Schema {
    schemars::schema_for!(Config)
}
