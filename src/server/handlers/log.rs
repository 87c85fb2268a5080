use axum::extract::State;
use axum::Json;

use crate::server::context::AppContext;
use crate::workspace::history::LogEntry;

/// GET /logs：最近的执行/同步记录，从旧到新
pub async fn list_logs(State(ctx): State<AppContext>) -> Json<Vec<LogEntry>> {
    Json(ctx.logs.snapshot())
}
