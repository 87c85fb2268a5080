use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use tracing::{debug, error, info, warn};

use crate::server::context::{AppContext, AppError};
use crate::server::handlers;
use crate::server::hub::ClientId;
use crate::server::protocol::{ClientMessage, ServerEvent, PROTOCOL_VERSION};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Handle a WebSocket connection
///
/// 连接建立即订阅广播中心；断开时 Subscription 被 drop，自动退订。
async fn handle_socket(mut socket: WebSocket, ctx: AppContext) {
    let mut subscription = ctx.hub.subscribe();
    let client_id = subscription.id();
    info!(client_id = %client_id, "New WebSocket connection established");

    let hello = ServerEvent::Hello {
        client_id: client_id.to_string(),
        version: PROTOCOL_VERSION,
    };
    if let Err(e) = send_event(&mut socket, &hello).await {
        error!("Failed to send Hello message: {}", e);
        return;
    }

    loop {
        tokio::select! {
            biased;  // 优先处理客户端消息

            msg_result = socket.recv() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, client_id, &ctx).await {
                            if let Err(e) = send_event(&mut socket, &reply).await {
                                error!("Failed to send reply: {}", e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(client_id = %client_id, "Received binary message, JSON text expected");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(client_id = %client_id, "WebSocket connection closed by client");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Handled automatically by axum
                    }
                    Some(Err(e)) => {
                        error!(client_id = %client_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(client_id = %client_id, "WebSocket connection closed (recv returned None)");
                        break;
                    }
                }
            }

            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!("Broadcast hub closed");
                    break;
                };
                if let Err(e) = send_event(&mut socket, &event).await {
                    error!(client_id = %client_id, "Failed to forward event: {}", e);
                    break;
                }
            }
        }
    }

    info!(client_id = %client_id, "WebSocket connection finished");
}

/// 处理一条客户端消息，返回需要单独回复给该连接的事件
async fn handle_client_message(
    text: &str,
    client_id: ClientId,
    ctx: &AppContext,
) -> Option<ServerEvent> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(client_id = %client_id, "Invalid client message: {}", e);
            return Some(ServerEvent::Error {
                code: "invalid_input".to_string(),
                message: format!("Invalid message: {}", e),
            });
        }
    };

    match msg {
        ClientMessage::FileChange { file_path, content } => {
            // 广播给除发送者以外的所有连接；失败只回复发送者
            match handlers::save_file(ctx, file_path, content, Some(client_id)).await {
                Ok(()) => None,
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientMessage::Ping => Some(ServerEvent::Pong),
    }
}

fn error_event(e: &AppError) -> ServerEvent {
    ServerEvent::Error {
        code: e.code().to_string(),
        message: e.to_string(),
    }
}

/// 发送 JSON 文本帧
pub async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), String> {
    let text = serde_json::to_string(event).map_err(|e| e.to_string())?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| e.to_string())
}
