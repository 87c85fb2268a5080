use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use remote_workspace::server::{build_router, AppContext, ServerEvent, CLIENT_ID_HEADER};
use remote_workspace::workspace::ServerConfig;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (String, AppContext, TempDir) {
    let temp = TempDir::new().unwrap();
    let config = ServerConfig {
        workspace_dir: temp.path().join("workspace"),
        ..ServerConfig::default()
    };
    let ctx = AppContext::new(&config).unwrap();
    let app = build_router(ctx.clone(), None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}/ws", addr), ctx, temp)
}

async fn next_event(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Connect and consume the greeting; returns the client and its id
async fn connect(url: &str) -> (Client, String) {
    let (mut client, _) = connect_async(url).await.unwrap();
    let hello = next_event(&mut client).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["version"], 1);
    let id = hello["clientId"].as_str().unwrap().to_string();
    (client, id)
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

/// 发布一条匿名标记事件：若之前有遗漏的广播，会先于标记到达
fn publish_marker(ctx: &AppContext, marker: &str) {
    ctx.hub.publish(
        None,
        ServerEvent::RepoCloned {
            message: marker.to_string(),
        },
    );
}

#[tokio::test]
async fn file_change_reaches_everyone_but_the_sender() {
    let (url, ctx, _temp) = start_server().await;
    let (mut author, _) = connect(&url).await;
    let (mut viewer, _) = connect(&url).await;

    send(
        &mut author,
        json!({"type": "fileChange", "filePath": "notes/todo.md", "content": "- ship"}),
    )
    .await;

    let update = next_event(&mut viewer).await;
    assert_eq!(
        update,
        json!({"type": "fileUpdate", "filePath": "notes/todo.md", "content": "- ship"})
    );
    assert_eq!(
        std::fs::read_to_string(ctx.root.path().join("notes/todo.md")).unwrap(),
        "- ship"
    );

    publish_marker(&ctx, "marker");
    let next = next_event(&mut author).await;
    assert_eq!(next, json!({"type": "repoCloned", "message": "marker"}));
}

#[tokio::test]
async fn http_save_with_client_id_skips_that_connection() {
    let (url, ctx, _temp) = start_server().await;
    let (mut author, author_id) = connect(&url).await;
    let (mut viewer, _) = connect(&url).await;

    let app = build_router(ctx.clone(), None);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/file")
                .header("content-type", "application/json")
                .header(CLIENT_ID_HEADER, author_id)
                .body(Body::from(
                    json!({"filePath": "a.txt", "content": "one"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let update = next_event(&mut viewer).await;
    assert_eq!(update["type"], "fileUpdate");
    assert_eq!(update["filePath"], "a.txt");

    publish_marker(&ctx, "after-save");
    let next = next_event(&mut author).await;
    assert_eq!(next["message"], "after-save");
}

#[tokio::test]
async fn ping_and_errors_are_answered_to_the_sender_only() {
    let (url, ctx, _temp) = start_server().await;
    let (mut client, _) = connect(&url).await;
    let (mut other, _) = connect(&url).await;

    send(&mut client, json!({"type": "ping"})).await;
    assert_eq!(next_event(&mut client).await, json!({"type": "pong"}));

    send(
        &mut client,
        json!({"type": "fileChange", "filePath": "..", "content": "x"}),
    )
    .await;
    let error = next_event(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "invalid_path");

    send(&mut client, Value::String("garbage".to_string())).await;
    let error = next_event(&mut client).await;
    assert_eq!(error["code"], "invalid_input");

    // 其他连接什么都没收到
    publish_marker(&ctx, "quiet");
    assert_eq!(next_event(&mut other).await["message"], "quiet");
}
