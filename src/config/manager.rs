use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::expand_tilde;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TERMINAL_SCROLLBACK_LINES: usize = 1000;

/// Application settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub default_port: u16,
    /// Dial timeout in seconds
    pub connection_timeout: u64,
    pub known_hosts_path: Option<PathBuf>,
    pub terminal_scrollback_lines: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_SSH_PORT,
            connection_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            known_hosts_path: None,
            terminal_scrollback_lines: DEFAULT_TERMINAL_SCROLLBACK_LINES,
        }
    }
}

/// Describes one SSH destination as collected by the connection form.
///
/// Handed by value to the connection protocol; the resulting session keeps its
/// own copy.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<String>,
    /// `[user@]host[:port]` of an intermediate server to tunnel through
    pub jump_host: Option<String>,
    /// Comma-separated host key algorithm names, e.g. `ssh-ed25519,rsa-sha2-256`
    pub host_key_algorithms: Option<String>,
    pub accept_unknown_host_keys: bool,
    pub known_hosts_path: Option<PathBuf>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key_path", &self.private_key_path)
            .field("jump_host", &self.jump_host)
            .field("host_key_algorithms", &self.host_key_algorithms)
            .field("accept_unknown_host_keys", &self.accept_unknown_host_keys)
            .field("known_hosts_path", &self.known_hosts_path)
            .finish()
    }
}

impl Connection {
    /// Creates a new connection with the given parameters
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, path: impl Into<String>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_jump_host(mut self, spec: impl Into<String>) -> Self {
        self.jump_host = Some(spec.into());
        self
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn display_name(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Validates the connection parameters
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(AppError::ValidationError(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.username.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Known-hosts file used to verify this destination
    pub fn known_hosts_file(&self) -> Option<PathBuf> {
        match &self.known_hosts_path {
            Some(path) => Some(expand_tilde(&path.to_string_lossy())),
            None => dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")),
        }
    }

    /// Builds the descriptor for the jump host, if one is configured.
    ///
    /// Credentials and host-key settings are inherited; user and port default to
    /// the destination's username and 22.
    pub fn jump_connection(&self) -> Result<Option<Connection>> {
        let Some(spec) = self.jump_host.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if spec.is_empty() {
            return Ok(None);
        }
        let target = parse_target(spec, DEFAULT_SSH_PORT)?;
        Ok(Some(Connection {
            host: target.host,
            port: target.port,
            username: target.user.unwrap_or_else(|| self.username.clone()),
            password: self.password.clone(),
            private_key_path: self.private_key_path.clone(),
            jump_host: None,
            host_key_algorithms: self.host_key_algorithms.clone(),
            accept_unknown_host_keys: self.accept_unknown_host_keys,
            known_hosts_path: self.known_hosts_path.clone(),
        }))
    }
}

/// A `[user@]host[:port]` destination
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: u16,
}

pub fn parse_target(spec: &str, default_port: u16) -> Result<Target> {
    let spec = spec.trim();
    let (user, rest) = match spec.rsplit_once('@') {
        Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
        Some((_, rest)) => (None, rest),
        None => (None, spec),
    };

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']').ok_or_else(|| {
            AppError::ValidationError(format!("Unterminated IPv6 address in '{spec}'"))
        })?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(port),
            None if tail.is_empty() => None,
            None => {
                return Err(AppError::ValidationError(format!(
                    "Unexpected characters after address in '{spec}'"
                )));
            }
        };
        (host, port)
    } else {
        match rest.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (rest, None),
        }
    };

    if host.is_empty() {
        return Err(AppError::ValidationError(format!(
            "Missing host in '{spec}'"
        )));
    }

    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| AppError::ValidationError(format!("Invalid port in '{spec}'")))?,
        None => default_port,
    };

    Ok(Target {
        user,
        host: host.to_string(),
        port,
    })
}

/// Main configuration structure
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub settings: AppSettings,
}

/// Loads the settings file; connections themselves are never persisted.
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a configuration manager with a custom config path (useful for testing)
    pub fn with_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Directory holding the settings file and the log
    pub fn config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| AppError::ConfigError("Cannot determine home directory".to_string()))?;

        let config_dir = home_dir.join(".config").join("tabssh");

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                AppError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        Ok(config_dir)
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    fn load_config_from_path(config_path: &Path) -> Result<Config> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(config_path)
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &AppSettings {
        &self.config.settings
    }

    pub fn default_port(&self) -> u16 {
        match self.config.settings.default_port {
            0 => DEFAULT_SSH_PORT,
            port => port,
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.config.settings.connection_timeout.max(1))
    }

    pub fn known_hosts_path(&self) -> Option<&Path> {
        self.config.settings.known_hosts_path.as_deref()
    }

    pub fn set_known_hosts_path(&mut self, path: PathBuf) {
        self.config.settings.known_hosts_path = Some(path);
    }

    pub fn terminal_scrollback_lines(&self) -> usize {
        self.config.settings.terminal_scrollback_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(manager.settings(), &AppSettings::default());
        assert_eq!(manager.connection_timeout(), Duration::from_secs(10));
        assert_eq!(manager.default_port(), 22);
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[settings]\nconnection_timeout = 3\nknown_hosts_path = \"/tmp/kh\"\n",
        )
        .unwrap();

        let manager = ConfigManager::with_path(&path).unwrap();
        assert_eq!(manager.connection_timeout(), Duration::from_secs(3));
        assert_eq!(manager.known_hosts_path(), Some(Path::new("/tmp/kh")));
        assert_eq!(
            manager.terminal_scrollback_lines(),
            DEFAULT_TERMINAL_SCROLLBACK_LINES
        );
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[settings\n").unwrap();
        assert!(matches!(
            ConfigManager::with_path(&path),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_parse_target() {
        let cases = vec![
            ("example.com", None, "example.com", 22),
            ("root@example.com", Some("root"), "example.com", 22),
            ("root@example.com:2222", Some("root"), "example.com", 2222),
            ("[::1]:2200", None, "::1", 2200),
            ("ops@[fe80::1]", Some("ops"), "fe80::1", 22),
        ];

        for (spec, user, host, port) in cases {
            let target = parse_target(spec, 22).unwrap();
            assert_eq!(target.user.as_deref(), user, "{spec}");
            assert_eq!(target.host, host, "{spec}");
            assert_eq!(target.port, port, "{spec}");
        }

        assert!(parse_target("host:abc", 22).is_err());
        assert!(parse_target("host:0", 22).is_err());
        assert!(parse_target("user@", 22).is_err());
        assert!(parse_target("[::1", 22).is_err());
    }

    #[test]
    fn test_jump_connection_inherits_credentials() {
        let mut conn = Connection::new("10.0.0.5", 22, "deploy")
            .with_password("secret")
            .with_private_key("~/.ssh/id_ed25519")
            .with_jump_host("bastion.example.com:2222");
        conn.accept_unknown_host_keys = true;

        let jump = conn.jump_connection().unwrap().unwrap();
        assert_eq!(jump.host, "bastion.example.com");
        assert_eq!(jump.port, 2222);
        assert_eq!(jump.username, "deploy");
        assert_eq!(jump.password.as_deref(), Some("secret"));
        assert_eq!(jump.private_key_path.as_deref(), Some("~/.ssh/id_ed25519"));
        assert!(jump.accept_unknown_host_keys);
        assert!(jump.jump_host.is_none());

        let conn = conn.with_jump_host("admin@bastion");
        let jump = conn.jump_connection().unwrap().unwrap();
        assert_eq!(jump.username, "admin");
        assert_eq!(jump.port, 22);

        let conn = Connection::new("h", 22, "u").with_jump_host("   ");
        assert!(conn.jump_connection().unwrap().is_none());
    }

    #[test]
    fn test_validate() {
        assert!(Connection::new("host", 22, "user").validate().is_ok());
        assert!(Connection::new(" ", 22, "user").validate().is_err());
        assert!(Connection::new("host", 0, "user").validate().is_err());
        assert!(Connection::new("host", 22, "").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let conn = Connection::new("host", 22, "user").with_password("hunter2");
        let debug = format!("{conn:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
