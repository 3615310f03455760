//! Preview Proxy: reverse-proxies HTTP and WebSocket traffic from
//! `/preview/{appId}/*` to the workspace's currently-leased dev server port
//! (§4.7).

use crate::auth::AuthUser;
use crate::db::apps;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use futures::{SinkExt, StreamExt};

const NOT_RUNNING_BODY: &str = r#"<!doctype html>
<html>
<head><meta http-equiv="refresh" content="3"></head>
<body style="font-family: sans-serif; padding: 2rem;">
<h1>Workspace is not running</h1>
<p>Start the dev server to preview this workspace. This page refreshes automatically.</p>
</body>
</html>"#;

pub async fn proxy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((app_id, rest)): Path<(i64, String)>,
    request: Request<Body>,
) -> Response {
    let conn = match state.db.get() {
        Ok(conn) => conn,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = apps::find_owned(&conn, app_id, auth.id) {
        return err.into_response();
    }
    drop(conn);

    let status = state.supervisor.status(app_id).await;
    let Some(port) = status.port.filter(|_| status.running) else {
        return (StatusCode::SERVICE_UNAVAILABLE, Html(NOT_RUNNING_BODY)).into_response();
    };

    let is_websocket_upgrade = request
        .headers()
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if is_websocket_upgrade {
        let (mut parts, _) = request.into_parts();
        return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => {
                let target = format!("ws://127.0.0.1:{port}/{rest}");
                upgrade.on_upgrade(move |socket| bridge_websocket(socket, target))
            }
            Err(_) => StatusCode::BAD_GATEWAY.into_response(),
        };
    }

    proxy_http(request, port, rest).await
}

async fn proxy_http(request: Request<Body>, port: u16, rest: String) -> Response {
    let client = reqwest::Client::new();
    let method = request.method().clone();
    let query = request.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let target = format!("http://127.0.0.1:{port}/{rest}{query}");

    let mut builder = client.request(method, &target);
    for (name, value) in request.headers() {
        if name == axum::http::header::HOST {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.header(axum::http::header::HOST, format!("127.0.0.1:{port}"));

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };
    builder = builder.body(body);

    match builder.send().await {
        Ok(upstream) => {
            let status = upstream.status();
            let mut response = Response::builder().status(status);
            for (name, value) in upstream.headers() {
                response = response.header(name, value);
            }
            let bytes = upstream.bytes().await.unwrap_or_default();
            response.body(Body::from(bytes)).unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}

async fn bridge_websocket(client_socket: WebSocket, target: String) {
    let upstream = match tokio_tungstenite::connect_async(&target).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            tracing::warn!("preview websocket upgrade failed: {err}");
            return;
        }
    };

    let (mut client_tx, mut client_rx) = client_socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let forwarded = match message {
                WsMessage::Text(text) => tokio_tungstenite::tungstenite::Message::Text(text),
                WsMessage::Binary(bytes) => tokio_tungstenite::tungstenite::Message::Binary(bytes),
                WsMessage::Close(_) => break,
                _ => continue,
            };
            if upstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    let to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let forwarded = match message {
                tokio_tungstenite::tungstenite::Message::Text(text) => WsMessage::Text(text),
                tokio_tungstenite::tungstenite::Message::Binary(bytes) => WsMessage::Binary(bytes),
                tokio_tungstenite::tungstenite::Message::Close(_) => break,
                _ => continue,
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = to_upstream => {}
        _ = to_client => {}
    }
}
