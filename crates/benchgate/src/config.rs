//! Authentication configuration, supplied by the outer config layer.

use std::path::{Path, PathBuf};

/// Where the accepted credential came from. Drives the hint shown on the
/// login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    /// Password read from the config file.
    ConfigFile,
    /// Plaintext password from the `$PASSWORD` environment variable.
    EnvPassword,
    /// Pre-hashed password from the `$HASHED_PASSWORD` environment
    /// variable.
    EnvHashedPassword,
}

/// Read-only credential configuration, immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Plaintext secret, if one is configured.
    pub password: Option<String>,
    /// Pre-hashed secret. Takes precedence over `password` when both are
    /// present.
    pub hashed_password: Option<String>,
    pub source: PasswordSource,
    /// Config file location, only for user-facing messaging.
    pub config_path: PathBuf,
    /// Proxy domains a session cookie may be scoped to.
    pub proxy_domains: Vec<String>,
}

impl AuthConfig {
    pub fn with_password(password: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            password: Some(password.into()),
            hashed_password: None,
            source: PasswordSource::ConfigFile,
            config_path: config_path.into(),
            proxy_domains: Vec::new(),
        }
    }
}

/// Display a path with the home directory collapsed to `~`.
pub fn human_path(path: &Path) -> String {
    let display = path.display().to_string();
    if let Ok(home) = std::env::var("HOME")
        && !home.is_empty()
        && let Some(rest) = display.strip_prefix(&home)
    {
        return format!("~{rest}");
    }
    display
}
