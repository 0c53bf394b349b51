//! TOML-based configuration for viewsync.
//!
//! The repository password is never stored in the file: `password_env` names
//! an environment variable that is resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level and optional log file.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Repository server connection.
    pub server: ServerConfig,

    /// Project, view and working tree settings.
    pub workspace: WorkspaceConfig,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append logs to this file in addition to stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Repository server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path of the repository store opened by the bundled session.
    pub store: PathBuf,

    /// User to log on as.
    pub user: String,

    /// Environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Content cache agent, for sessions that support one.
    #[serde(default)]
    pub cache_agent: CacheAgentConfig,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAgentConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cache_host")]
    pub host: String,

    #[serde(default = "default_cache_port")]
    pub port: u16,
}

fn default_cache_host() -> String {
    "localhost".into()
}
fn default_cache_port() -> u16 {
    5201
}

impl Default for CacheAgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_cache_host(),
            port: default_cache_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Which project and view to work on, and how the local tree maps onto it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub project: String,

    pub view: String,

    /// Local directory substituted for the view root's working path.
    #[serde(default)]
    pub alternate_working_path: Option<String>,

    /// Case-sensitive path matching. Defaults to the platform's filesystem
    /// rule when unset.
    #[serde(default)]
    pub case_sensitive: Option<bool>,

    /// Release the lock after every checkin.
    #[serde(default)]
    pub unlock_on_checkin: bool,

    /// Take a lock after every checkout.
    #[serde(default)]
    pub lock_on_checkout: bool,

    /// Directory for the state database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".viewsync")
}

impl WorkspaceConfig {
    /// Case sensitivity in effect, falling back to the platform default.
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or_else(platform_case_sensitive)
    }
}

/// Windows and macOS filesystems fold case by default.
pub fn platform_case_sensitive() -> bool {
    !cfg!(any(target_os = "windows", target_os = "macos"))
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from environment variables. A missing variable
    /// logs a warning but does not fail; the session decides whether a
    /// password is required.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.server.password_env {
            self.server.password = resolve_optional_env(env_name, "server.password_env");
        }
        Ok(())
    }

    /// `(field, variable)` pairs whose variable did not resolve to a value.
    pub fn unresolved_env_vars(&self) -> Vec<(&'static str, &str)> {
        match (&self.server.password_env, &self.server.password) {
            (Some(env_name), None) => vec![("server.password_env", env_name.as_str())],
            _ => Vec::new(),
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("server.user", self.server.user.as_str()),
            ("workspace.project", self.workspace.project.as_str()),
            ("workspace.view", self.workspace.view.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "must not be empty".into(),
                });
            }
        }
        if self.server.store.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.store".into(),
                detail: "must not be empty".into(),
            });
        }
        if let Some(alt) = &self.workspace.alternate_working_path {
            if alt.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "workspace.alternate_working_path".into(),
                    detail: "must be omitted or non-empty".into(),
                });
            }
        }
        if self.server.cache_agent.enabled && self.server.cache_agent.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.cache_agent.port".into(),
                detail: "port must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// A starter configuration written by `viewsync init`.
    pub fn sample() -> &'static str {
        r#"[logging]
level = "info"

[server]
store = "repository.json"
user = "admin"
# password_env = "VIEWSYNC_PASSWORD"

[server.cache_agent]
enabled = false

[workspace]
project = "project"
view = "main"
# alternate_working_path = "/path/to/checkout"
# case_sensitive = true
unlock_on_checkin = false
lock_on_checkout = false
data_dir = ".viewsync"
"#
    }
}

fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
