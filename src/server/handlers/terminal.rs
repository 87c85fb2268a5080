use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::warn;

use crate::server::context::{require, AppContext, AppError};
use crate::server::protocol::{RunResponse, TerminalRequest, TerminalResponse};

/// POST /terminal：执行任意 shell 命令，返回未截断的 stdout
pub async fn run_terminal(
    State(ctx): State<AppContext>,
    body: Result<Json<TerminalRequest>, JsonRejection>,
) -> Result<Json<TerminalResponse>, AppError> {
    let Json(req) = body?;
    let command = require(req.command, "command")?;

    let output = ctx.runner.execute(&command).await?;
    Ok(Json(TerminalResponse {
        output: output.stdout,
    }))
}

/// POST /run：在已克隆的项目中执行配置的运行命令
///
/// 检查与执行持有同一份共享访问，克隆进行中时等待其完成
pub async fn run_project(State(ctx): State<AppContext>) -> Result<Json<RunResponse>, AppError> {
    let access = ctx.root.shared().await;

    let root = ctx.root.clone();
    let empty = tokio::task::spawn_blocking(move || root.is_empty())
        .await?
        .map_err(|e| AppError::Io(format!("Failed to inspect workspace: {}", e)))?;
    if empty {
        drop(access);
        let message = "No project found in workspace, clone a repository first";
        warn!("{}", message);
        ctx.logs.error(message);
        return Err(AppError::InvalidInput(message.to_string()));
    }

    let output = ctx.runner.execute_locked(&ctx.run_command, access).await?;
    Ok(Json(RunResponse {
        message: "Project executed successfully".to_string(),
        output: output.stdout,
    }))
}
