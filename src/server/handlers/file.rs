use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::Json;
use std::path::Path;
use tracing::debug;

use crate::server::context::{require, AppContext, AppError};
use crate::server::file_api::{self, FileApiError, FileNode};
use crate::server::hub::ClientId;
use crate::server::protocol::{
    CreateFolderRequest, DeleteFileRequest, FileQuery, ListQuery, MessageResponse,
    SaveFileRequest, ServerEvent, CLIENT_ID_HEADER,
};

/// 在共享访问下于 blocking 线程池执行文件操作；失败同时写入历史
async fn run_file_op<T, F>(ctx: &AppContext, action: &str, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T, FileApiError> + Send + 'static,
{
    let access = ctx.root.shared().await;
    let root = ctx.root.path().to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let _access = access;
        op(&root)
    })
    .await?;

    result.map_err(|e| {
        ctx.logs.error(format!("{}: {}", action, e));
        AppError::from(e)
    })
}

/// Write `content` to `file_path` and broadcast it to every subscriber but `origin`.
///
/// Shared by `POST /file` and the real-time `fileChange` message.
pub async fn save_file(
    ctx: &AppContext,
    file_path: String,
    content: String,
    origin: Option<ClientId>,
) -> Result<(), AppError> {
    let (path, body) = (file_path.clone(), content.clone());
    let size = run_file_op(ctx, &format!("Failed to save {}", file_path), move |root| {
        file_api::write_file(root, &path, &body)
    })
    .await?;

    debug!(path = %file_path, size, ?origin, "File saved");
    ctx.hub
        .publish(origin, ServerEvent::FileUpdate { file_path, content });
    Ok(())
}

/// 从请求头读取发起者连接 id，格式错误时视为匿名
fn origin_from_headers(headers: &HeaderMap) -> Option<ClientId> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// GET /files?recursive=
pub async fn list_files(
    State(ctx): State<AppContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<FileNode>>, AppError> {
    let Query(query) = query?;
    let recursive = query.recursive;
    let nodes = run_file_op(&ctx, "Failed to list files", move |root| {
        file_api::list_files(root, recursive)
    })
    .await?;
    Ok(Json(nodes))
}

/// GET /file?filePath=
pub async fn read_file(
    State(ctx): State<AppContext>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let file_path = require(query.file_path, "filePath")?;

    let path = file_path.clone();
    let content = run_file_op(&ctx, &format!("Failed to read {}", file_path), move |root| {
        file_api::read_file(root, &path)
    })
    .await?;

    let mime = mime_guess::from_path(&file_path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], content))
}

/// POST /file
pub async fn write_file(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Result<Json<SaveFileRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = body?;
    let file_path = require(req.file_path, "filePath")?;
    let content = req
        .content
        .ok_or_else(|| AppError::InvalidInput("Missing required field 'content'".to_string()))?;

    save_file(&ctx, file_path, content, origin_from_headers(&headers)).await?;
    Ok(Json(MessageResponse::new("File saved successfully!")))
}

/// DELETE /file
pub async fn delete_file(
    State(ctx): State<AppContext>,
    body: Result<Json<DeleteFileRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = body?;
    let file_path = require(req.file_path, "filePath")?;

    let path = file_path.clone();
    run_file_op(&ctx, &format!("Failed to delete {}", file_path), move |root| {
        file_api::delete_path(root, &path)
    })
    .await?;

    debug!(path = %file_path, "Path deleted");
    Ok(Json(MessageResponse::new("File/Folder deleted successfully")))
}

/// POST /folder
pub async fn create_folder(
    State(ctx): State<AppContext>,
    body: Result<Json<CreateFolderRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = body?;
    let folder_path = require(req.folder_path, "folderPath")?;

    let path = folder_path.clone();
    run_file_op(
        &ctx,
        &format!("Failed to create folder {}", folder_path),
        move |root| file_api::create_dir(root, &path),
    )
    .await?;

    Ok(Json(MessageResponse::new("Folder created successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_headers() {
        let id = uuid::Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert!(origin_from_headers(&headers).is_none());

        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(origin_from_headers(&headers), Some(id));

        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(origin_from_headers(&headers).is_none());
    }
}
