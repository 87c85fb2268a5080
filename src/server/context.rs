//! 共享上下文与错误类型
//!
//! `AppContext` 收拢所有 handler 共享的依赖；`AppError` 是 HTTP 边界的统一错误，
//! 由各子系统错误转换而来，并自动转换为 JSON 错误响应。

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use thiserror::Error;

use crate::server::file_api::FileApiError;
use crate::server::hub::BroadcastHub;
use crate::server::protocol::ErrorResponse;
use crate::workspace::command::{CommandError, CommandRunner};
use crate::workspace::config::ServerConfig;
use crate::workspace::history::{LogRingBuffer, SharedLogs};
use crate::workspace::root::WorkspaceRoot;
use crate::workspace::sync::{RepositorySync, SyncError};

/// Handler 上下文：每个请求和实时连接共享同一份
#[derive(Clone)]
pub struct AppContext {
    pub root: WorkspaceRoot,
    pub logs: SharedLogs,
    pub hub: BroadcastHub,
    pub sync: Arc<RepositorySync>,
    pub runner: Arc<CommandRunner>,
    /// `POST /run` 执行的命令
    pub run_command: Arc<str>,
}

impl AppContext {
    /// Open (creating if needed) the workspace root and wire the subsystems to it
    pub fn new(config: &ServerConfig) -> std::io::Result<Self> {
        let root = WorkspaceRoot::open(&config.workspace_dir)?;
        let logs: SharedLogs = Arc::new(LogRingBuffer::new());
        let hub = BroadcastHub::new(config.broadcast_capacity);

        let sync = Arc::new(RepositorySync::new(root.clone(), logs.clone(), hub.clone()));
        let runner = Arc::new(
            CommandRunner::new(root.clone(), logs.clone(), config.shell.clone())
                .with_timeout(config.command_timeout()),
        );

        Ok(Self {
            root,
            logs,
            hub,
            sync,
            runner,
            run_command: Arc::from(config.run_command.as_str()),
        })
    }
}

/// 统一应用错误类型：转换为带状态码的 JSON 错误响应
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidPath(String),

    #[error("{0}")]
    InvalidTarget(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    CloneFailed(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// 转换为协议 error code
    pub fn code(&self) -> &str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::InvalidPath(_) => "invalid_path",
            AppError::InvalidTarget(_) => "invalid_target",
            AppError::NotFound(_) => "not_found",
            AppError::Io(_) => "io_error",
            AppError::CloneFailed(_) => "clone_failed",
            AppError::ExecutionFailed(_) => "execution_failed",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::InvalidPath(_) | AppError::InvalidTarget(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Io(_)
            | AppError::CloneFailed(_)
            | AppError::ExecutionFailed(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_error_response())).into_response()
    }
}

impl From<FileApiError> for AppError {
    fn from(e: FileApiError) -> Self {
        match e {
            FileApiError::EmptyPath | FileApiError::PathEscape | FileApiError::PathTooLong => {
                AppError::InvalidPath(e.to_string())
            }
            FileApiError::FileNotFound => AppError::NotFound(e.to_string()),
            FileApiError::IsDirectory => AppError::InvalidTarget(e.to_string()),
            FileApiError::IoError(_) => AppError::Io(e.to_string()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::InvalidUrl(_) => AppError::InvalidInput(e.to_string()),
            SyncError::ClearFailed(_) | SyncError::CloneFailed(_) => {
                AppError::CloneFailed(e.to_string())
            }
            SyncError::Internal(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<CommandError> for AppError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Empty => AppError::InvalidInput(e.to_string()),
            _ => AppError::ExecutionFailed(e.to_string()),
        }
    }
}

/// 从 tokio JoinError 转换
impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task failed: {}", e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::InvalidInput(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::InvalidInput(e.body_text())
    }
}

/// 必填字段：缺失或仅含空白时返回 400
pub fn require(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("Missing required field '{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(FileApiError::FileNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(FileApiError::PathEscape).code(),
            "invalid_path"
        );
        assert_eq!(
            AppError::from(FileApiError::IsDirectory).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(SyncError::CloneFailed("fatal".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(SyncError::InvalidUrl("-x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(CommandError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_require() {
        assert_eq!(require(Some("a.txt".into()), "filePath").unwrap(), "a.txt");
        assert!(matches!(
            require(Some("  ".into()), "filePath"),
            Err(AppError::InvalidInput(_))
        ));
        let err = require(None, "repoUrl").unwrap_err();
        assert!(err.to_string().contains("repoUrl"));
    }
}
