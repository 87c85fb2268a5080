//! Server configuration (config.toml)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::workspace::schedule::DEFAULT_REFRESH_SCHEDULE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Server configuration, loaded from TOML and overridden by CLI flags / env vars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    /// 静态前端资源目录，未配置时不挂载
    pub static_dir: Option<PathBuf>,
    /// 配置后启用定时刷新
    pub default_repo_url: Option<String>,
    #[serde(default = "default_refresh_schedule")]
    pub refresh_schedule: String,
    /// `POST /run` 执行的命令
    #[serde(default = "default_run_command")]
    pub run_command: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Unset means commands may run forever.
    pub command_timeout_secs: Option<u64>,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_refresh_schedule() -> String {
    DEFAULT_REFRESH_SCHEDULE.to_string()
}

fn default_run_command() -> String {
    "npm install && npm test".to_string()
}

fn default_shell() -> String {
    if cfg!(windows) {
        "cmd".to_string()
    } else {
        "/bin/sh".to_string()
    }
}

fn default_broadcast_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workspace_dir: default_workspace_dir(),
            static_dir: None,
            default_repo_url: None,
            refresh_schedule: default_refresh_schedule(),
            run_command: default_run_command(),
            shell: default_shell(),
            command_timeout_secs: None,
            broadcast_capacity: default_broadcast_capacity(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// `~/.config/remote-workspace/config.toml` (platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("remote-workspace").join("config.toml"))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// 空字符串视为未配置
    pub fn default_repo_url(&self) -> Option<&str> {
        self.default_repo_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.workspace_dir, PathBuf::from("workspace"));
        assert_eq!(config.refresh_schedule, "0 0 * * *");
        assert!(config.default_repo_url().is_none());
        assert!(config.command_timeout().is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
port = 8080
workspace_dir = "/srv/workspace"
default_repo_url = "https://example.com/team/app.git"
refresh_schedule = "30 3 * * *"
command_timeout_secs = 120
log_format = "json"
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(
            config.default_repo_url(),
            Some("https://example.com/team/app.git")
        );
        assert_eq!(config.refresh_schedule, "30 3 * * *");
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.run_command, "npm install && npm test");
    }

    #[test]
    fn test_blank_repo_url_disables_schedule() {
        let config = ServerConfig {
            default_repo_url: Some("   ".to_string()),
            ..ServerConfig::default()
        };
        assert!(config.default_repo_url().is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = ServerConfig::load(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(
            ServerConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
