use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::server::context::AppContext;
use crate::server::handlers::{file, log, repo, terminal};
use crate::server::protocol::PROTOCOL_VERSION;
use crate::server::ws::ws_handler;
use crate::workspace::config::ServerConfig;
use crate::workspace::schedule::ScheduleCoordinator;

/// Build the HTTP + WebSocket router.
///
/// `static_dir`, when given, is served for every path no route claims.
pub fn build_router(ctx: AppContext, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/files", get(file::list_files))
        .route(
            "/file",
            get(file::read_file)
                .post(file::write_file)
                .delete(file::delete_file),
        )
        .route("/folder", post(file::create_folder))
        .route("/clone", post(repo::clone_repo))
        .route("/run", post(terminal::run_project))
        .route("/terminal", post(terminal::run_terminal))
        .route("/logs", get(log::list_logs))
        .route("/ws", get(ws_handler));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Run the server until Ctrl-C
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    if which::which("git").is_err() {
        warn!("git not found on PATH, clone requests will fail");
    }

    let ctx = AppContext::new(&config)?;
    info!(root = %ctx.root.path().display(), "Workspace root ready");

    if let Some(url) = config.default_repo_url() {
        let coordinator =
            ScheduleCoordinator::new(Arc::clone(&ctx.sync), url, &config.refresh_schedule)?;
        coordinator.spawn();
    } else {
        info!("No default repository configured, scheduled refresh disabled");
    }

    let app = build_router(ctx, config.static_dir.as_deref());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Listening on http://{} (ws://{}/ws, protocol v{})",
        addr, addr, PROTOCOL_VERSION
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
