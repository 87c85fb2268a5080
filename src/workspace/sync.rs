//! Repository sync - wipe the workspace root and clone a repository into it

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::server::hub::BroadcastHub;
use crate::server::protocol::ServerEvent;
use crate::workspace::history::SharedLogs;
use crate::workspace::root::WorkspaceRoot;

/// 允许的 URL scheme；scp 风格（git@host:path）与本地路径不解析为 URL，直接放行
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ssh", "git", "file"];

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to clear workspace: {0}")]
    ClearFailed(String),
    #[error("Git clone failed: {0}")]
    CloneFailed(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub struct RepositorySync {
    root: WorkspaceRoot,
    logs: SharedLogs,
    hub: BroadcastHub,
}

impl RepositorySync {
    pub fn new(root: WorkspaceRoot, logs: SharedLogs, hub: BroadcastHub) -> Self {
        Self { root, logs, hub }
    }

    /// Replace the workspace contents with a fresh clone of `url`.
    ///
    /// Holds exclusive access for the whole wipe + clone. A failed clone is not
    /// rolled back: the root may be left empty or partially populated.
    pub async fn clone_repo(&self, url: &str) -> Result<(), SyncError> {
        let url = url.trim();
        if let Err(e) = validate_repo_url(url) {
            self.logs.error(e.to_string());
            return Err(e);
        }

        let result = {
            let _exclusive = self.root.exclusive().await;
            info!(url = %url, root = %self.root.path().display(), "Refreshing workspace");
            self.clone_locked(url).await
        };

        match &result {
            Ok(()) => {
                info!(url = %url, "Repository cloned successfully");
                self.logs
                    .success(format!("Repository cloned successfully: {}", url));
                self.hub.publish(
                    None,
                    ServerEvent::RepoCloned {
                        message: format!("Repository {} cloned successfully", url),
                    },
                );
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Repository clone failed");
                self.logs.error(e.to_string());
            }
        }

        result
    }

    async fn clone_locked(&self, url: &str) -> Result<(), SyncError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || root.clear())
            .await
            .map_err(|e| SyncError::Internal(format!("Task failed: {}", e)))?
            .map_err(|e| SyncError::ClearFailed(e.to_string()))?;

        let output = Command::new("git")
            .arg("clone")
            .arg("--")
            .arg(url)
            .arg(".")
            .current_dir(self.root.path())
            .output()
            .await
            .map_err(|e| SyncError::CloneFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::CloneFailed(stderr.trim().to_string()));
        }

        Ok(())
    }
}

/// Reject empty URLs, option-looking arguments and unsupported transports
pub fn validate_repo_url(url: &str) -> Result<(), SyncError> {
    if url.is_empty() {
        return Err(SyncError::InvalidUrl("URL cannot be empty".to_string()));
    }
    if url.starts_with('-') {
        return Err(SyncError::InvalidUrl(url.to_string()));
    }
    // git 的 <transport>::<address> 远程助手语法
    if let Some((transport, _)) = url.split_once("::") {
        let is_transport = !transport.is_empty()
            && transport
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if is_transport {
            return Err(SyncError::InvalidUrl(format!(
                "unsupported transport '{}'",
                transport
            )));
        }
    }
    if let Ok(parsed) = url::Url::parse(url) {
        // Windows 盘符（C:\repo）会被解析成单字母 scheme
        let scheme = parsed.scheme();
        if scheme.len() > 1 && !ALLOWED_SCHEMES.contains(&scheme) {
            return Err(SyncError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }
    }
    Ok(())
}
