use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::server::context::{require, AppContext, AppError};
use crate::server::protocol::{CloneRequest, MessageResponse};

/// POST /clone
///
/// Wipes the workspace root and clones `repoUrl` into it. Waits for in-flight
/// file operations and commands to drain first; anything that arrives while the
/// clone is running waits for it to finish.
pub async fn clone_repo(
    State(ctx): State<AppContext>,
    body: Result<Json<CloneRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = body?;
    let repo_url = require(req.repo_url, "repoUrl")?;

    ctx.sync.clone_repo(&repo_url).await?;
    Ok(Json(MessageResponse::new("Repository cloned successfully")))
}
