// SPDX-License-Identifier: MIT
pub mod auth;
pub mod event;
pub mod handlers;

use crate::error::EngineError;
use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes — mirrored by every deskd client ────────────────────────────
//
// notFound          = -32001
// forbidden         = -32002
// invalidTransition = -32003
// alreadyClaimed    = -32004
// capacityExceeded  = -32005
// validation        = -32006
// conflict          = -32007

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const UNAUTHORIZED: i32 = -32000;
const NOT_FOUND: i32 = -32001;
const FORBIDDEN: i32 = -32002;
const INVALID_TRANSITION: i32 = -32003;
const ALREADY_CLAIMED: i32 = -32004;
const CAPACITY_EXCEEDED: i32 = -32005;
const VALIDATION: i32 = -32006;
const CONFLICT: i32 = -32007;

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "IPC server listening (WebSocket + HTTP health on same port)");

    // Announce readiness to anyone who subscribes after connect
    ctx.events.broadcast(
        "daemon.ready",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "port": ctx.config.port
        }),
    );

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping IPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("IPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The engine shares one port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so load balancers can check liveness without a WS
/// library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let active = ctx.tickets.store().count_active().await.unwrap_or(0);
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "active_tickets": active,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from WebSocket
    // upgrades; both share the same port. All GET requests other than
    // "GET /health" fall through to the WS handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // ── Auth challenge ───────────────────────────────────────────────────────
    // The first message from every client must be a `daemon.auth` RPC call
    // carrying the correct token. This keeps other local processes from
    // connecting and issuing engine commands with a forged actor identity.
    //
    // Token is stored at {data_dir}/auth_token with mode 0600. The controller
    // that fronts the engine reads this file and sends it on every connect.
    if !ctx.auth_token.is_empty() {
        let first = tokio::time::timeout(std::time::Duration::from_secs(10), stream.next()).await;

        let text = match first {
            Ok(Some(Ok(Message::Text(t)))) => t,
            // Timeout, connection closed, or non-text frame — reject silently.
            _ => return Ok(()),
        };

        let req: RpcRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) => {
                let _ = sink
                    .send(Message::Text(error_response(
                        Value::Null,
                        PARSE_ERROR,
                        "Parse error",
                    )))
                    .await;
                return Ok(());
            }
        };

        let id = req.id.clone().unwrap_or(Value::Null);

        if req.method != "daemon.auth" {
            let _ = sink
                .send(Message::Text(error_response(
                    id,
                    UNAUTHORIZED,
                    "Unauthorized — send daemon.auth first",
                )))
                .await;
            return Ok(());
        }

        let provided = req
            .params
            .as_ref()
            .and_then(|p| p.get("token"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if provided != ctx.auth_token {
            let _ = sink
                .send(Message::Text(error_response(
                    id,
                    UNAUTHORIZED,
                    "Unauthorized — invalid token",
                )))
                .await;
            return Ok(());
        }

        // Auth success — send the RPC response and continue.
        let resp = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "authenticated": true }
        });
        let _ = sink.send(Message::Text(resp.to_string())).await;
        debug!("client authenticated");
    }

    let mut broadcast_rx = ctx.events.subscribe();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch_text(&text, &ctx).await;
                        if let Err(e) = sink.send(Message::Text(response)).await {
                            warn!(err = %e, "send error");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing broadcast event
            event = broadcast_rx.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "broadcast send error");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }
    Ok(())
}

pub(crate) async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    let result = dispatch(&req.method, params, ctx).await;

    match result {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            let (code, msg) = classify_error(&e, &req.method);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> anyhow::Result<Value> {
    match method {
        "daemon.ping" => handlers::daemon::ping(params, ctx).await,
        "daemon.status" => handlers::daemon::status(params, ctx).await,
        "ticket.create" => handlers::tickets::create(params, ctx).await,
        "ticket.get" => handlers::tickets::get(params, ctx).await,
        "ticket.list" => handlers::tickets::list(params, ctx).await,
        "ticket.update" => handlers::tickets::update(params, ctx).await,
        "ticket.cancel" => handlers::tickets::cancel(params, ctx).await,
        "ticket.delete" => handlers::tickets::delete(params, ctx).await,
        "ticket.claim" => handlers::tickets::claim(params, ctx).await,
        "ticket.assign" => handlers::tickets::assign(params, ctx).await,
        "ticket.status" => handlers::tickets::status(params, ctx).await,
        "ticket.resolve" => handlers::tickets::resolve(params, ctx).await,
        "ticket.priority" => handlers::tickets::priority(params, ctx).await,
        "ticket.respond" => handlers::tickets::respond(params, ctx).await,
        "ticket.responses" => handlers::tickets::responses(params, ctx).await,
        "response.update" => handlers::tickets::update_response(params, ctx).await,
        "response.delete" => handlers::tickets::delete_response(params, ctx).await,
        "agent.register" => handlers::agents::register(params, ctx).await,
        "agent.availability" => handlers::agents::availability(params, ctx).await,
        "agent.get" => handlers::agents::get(params, ctx).await,
        "agent.list" => handlers::agents::list(params, ctx).await,
        "agent.board" => handlers::agents::board(params, ctx).await,
        "agent.performance" => handlers::agents::performance(params, ctx).await,
        "review.create" => handlers::reviews::create(params, ctx).await,
        "review.update" => handlers::reviews::update(params, ctx).await,
        "review.delete" => handlers::reviews::delete(params, ctx).await,
        "review.publish" => handlers::reviews::publish(params, ctx).await,
        "review.feature" => handlers::reviews::feature(params, ctx).await,
        "review.list" => handlers::reviews::list(params, ctx).await,
        "insights.company" => handlers::insights::company(params, ctx).await,
        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

fn classify_error(e: &anyhow::Error, _method: &str) -> (i32, String) {
    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if let Some(engine) = e.downcast_ref::<EngineError>() {
        let code = match engine {
            EngineError::NotFound(_) => NOT_FOUND,
            EngineError::Forbidden(_) => FORBIDDEN,
            EngineError::InvalidTransition(_) => INVALID_TRANSITION,
            EngineError::AlreadyClaimed { .. } => ALREADY_CLAIMED,
            EngineError::CapacityExceeded { .. } => CAPACITY_EXCEEDED,
            EngineError::Validation(_) => VALIDATION,
            EngineError::Conflict(_) => CONFLICT,
            EngineError::Timeout(_) | EngineError::Database(_) => {
                error!(err = %e, "storage error");
                return (INTERNAL_ERROR, "Internal error".to_string());
            }
        };
        return (code, engine.to_string());
    }
    if msg.contains("missing field") || msg.contains("invalid type") {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = %e, "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_their_codes() {
        let cases: Vec<(EngineError, i32)> = vec![
            (EngineError::not_found("ticket", 1), NOT_FOUND),
            (EngineError::Forbidden("no".to_string()), FORBIDDEN),
            (
                EngineError::InvalidTransition("closed".to_string()),
                INVALID_TRANSITION,
            ),
            (
                EngineError::AlreadyClaimed {
                    ticket_id: 1,
                    agent_id: 2,
                },
                ALREADY_CLAIMED,
            ),
            (
                EngineError::CapacityExceeded {
                    agent_id: 1,
                    current: 5,
                    max: 5,
                },
                CAPACITY_EXCEEDED,
            ),
            (EngineError::Validation("blank".to_string()), VALIDATION),
            (EngineError::Conflict("dup".to_string()), CONFLICT),
        ];
        for (err, want) in cases {
            let (code, _) = classify_error(&anyhow::Error::new(err), "ticket.create");
            assert_eq!(code, want);
        }
    }

    #[test]
    fn unknown_method_and_bad_params_use_rpc_codes() {
        let (code, msg) = classify_error(&anyhow::anyhow!("METHOD_NOT_FOUND:nope"), "nope");
        assert_eq!(code, METHOD_NOT_FOUND);
        assert_eq!(msg, "Method not found");

        let serde_err =
            serde_json::from_value::<i64>(Value::String("x".to_string())).unwrap_err();
        let (code, _) = classify_error(&anyhow::Error::new(serde_err), "ticket.create");
        assert_eq!(code, INVALID_PARAMS);
    }

    #[test]
    fn storage_errors_stay_internal() {
        let (code, msg) = classify_error(
            &anyhow::Error::new(EngineError::Database(sqlx::Error::RowNotFound)),
            "ticket.get",
        );
        assert_eq!(code, INTERNAL_ERROR);
        assert_eq!(msg, "Internal error");
    }

    #[test]
    fn error_responses_are_valid_jsonrpc() {
        let raw = error_response(Value::from(7), NOT_FOUND, "ticket 9 not found");
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 7);
        assert_eq!(v["error"]["code"], NOT_FOUND);
        assert!(v.get("result").is_none());
    }
}
