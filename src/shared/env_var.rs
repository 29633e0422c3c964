//! Centralized reader for COMMITFLOW_* environment variables.
//!
//! Environment variable names are defined as private constants here;
//! external code accesses values through the `EnvVars` struct.

const TOKEN: &str = "COMMITFLOW_TOKEN";
const CONFIG_DIR: &str = "COMMITFLOW_CONFIG_DIR";
const STATE_DIR: &str = "COMMITFLOW_STATE_DIR";
const LOG: &str = "COMMITFLOW_LOG";

/// Snapshot of all COMMITFLOW_* environment variables at load time.
pub struct EnvVars {
    /// Access token for the direct backend. Falls back to `gh auth token`.
    pub token: Option<String>,

    /// Overrides the directory searched for config.yaml.
    pub config_dir: Option<String>,

    /// Overrides the directory holding session records.
    pub state_dir: Option<String>,

    /// tracing filter directive, e.g. "commitflow=debug".
    pub log: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

impl EnvVars {
    /// Read all COMMITFLOW_* environment variables from the current process.
    pub fn load() -> Self {
        Self {
            token: non_empty_var(TOKEN),
            config_dir: non_empty_var(CONFIG_DIR),
            state_dir: non_empty_var(STATE_DIR),
            log: non_empty_var(LOG),
        }
    }

    /// Returns the env var name for LOG (used by the tracing filter).
    pub fn log_name() -> &'static str {
        LOG
    }
}
