// SPDX-License-Identifier: MIT
//! Integration tests for the deskd JSON-RPC server.
//! Spins up a real engine on a free port and drives the ticket lifecycle
//! over WebSocket, the way the controller does in production.

use deskd::{agents::RegisterAgent, config::DeskConfig, storage::Storage, AppContext};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::{Read as _, Write as _};
use std::net::TcpStream;
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Start an engine on a random port and return the WebSocket URL.
async fn start_test_daemon() -> (String, Arc<AppContext>) {
    start_daemon_with_token(String::new()).await
}

async fn start_daemon_with_token(auth_token: String) -> (String, Arc<AppContext>) {
    let data_dir = tempfile::tempdir().unwrap().keep();
    let port = get_free_port();

    let config = DeskConfig::new(
        Some(port),
        Some(data_dir.clone()),
        Some("warn".to_string()),
        None,
    );
    let storage = Storage::new(&data_dir).await.unwrap();
    let ctx = Arc::new(AppContext::new(config, storage, auth_token));

    let ctx_server = ctx.clone();
    tokio::spawn(async move {
        deskd::ipc::run(ctx_server).await.ok();
    });

    // Give server a moment to bind
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let url = format!("ws://127.0.0.1:{}", ctx.config.port);
    (url, ctx)
}

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn ws_rpc(url: &str, method: &str, params: Value) -> Value {
    let (mut ws, _) = connect_async(url).await.expect("ws connect failed");

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params
    });
    ws.send(Message::Text(serde_json::to_string(&request).unwrap()))
        .await
        .unwrap();

    // Read messages until we get the response (skip notifications)
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("id").is_some() {
                return v;
            }
        }
    }
}

struct Seed {
    company_id: i64,
    customer_id: i64,
    category_id: i64,
    agent_id: i64,
}

/// Provision the reference rows a lifecycle needs: one company with one
/// customer, one category, and one registered agent.
async fn seed_desk(ctx: &AppContext) -> Seed {
    let company = ctx
        .storage
        .create_company("Acme Support", Some("acme.test"))
        .await
        .unwrap();
    let customer = ctx
        .storage
        .create_customer(company.id, "Dana Field", "dana@acme.test")
        .await
        .unwrap();
    let category = ctx
        .storage
        .create_category(company.id, "Billing", None)
        .await
        .unwrap();
    let agent = ctx
        .agents
        .register_agent(&RegisterAgent {
            company_id: company.id,
            name: "Sam Ortiz".to_string(),
            email: "sam@acme.test".to_string(),
            department: Some("Billing".to_string()),
            specialization: None,
            max_concurrent_tickets: Some(5),
            shift_start: None,
            shift_end: None,
            working_days: None,
        })
        .await
        .unwrap();

    Seed {
        company_id: company.id,
        customer_id: customer.id,
        category_id: category.id,
        agent_id: agent.id,
    }
}

fn customer(id: i64) -> Value {
    json!({ "id": id, "role": "CUSTOMER" })
}

fn agent(id: i64) -> Value {
    json!({ "id": id, "role": "AGENT" })
}

fn admin() -> Value {
    json!({ "id": 0, "role": "ADMIN" })
}

#[tokio::test]
async fn test_daemon_ping() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "daemon.ping", json!({})).await;
    assert_eq!(resp["result"]["pong"], true);
}

#[tokio::test]
async fn test_daemon_status() {
    let (url, ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "daemon.status", json!({})).await;
    let result = &resp["result"];
    assert!(result["version"].is_string());
    assert!(result["uptime"].is_number());
    assert_eq!(result["active_tickets"], 0);
    assert_eq!(result["port"], ctx.config.port);
}

#[tokio::test]
async fn test_method_not_found() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "no.such.method", json!({})).await;
    assert_eq!(resp["error"]["code"], -32601);
}

#[tokio::test]
async fn test_missing_params_are_invalid_params() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(
        &url,
        "ticket.create",
        json!({ "actor": { "id": 1, "role": "CUSTOMER" } }),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32602);
}

#[tokio::test]
async fn test_full_ticket_lifecycle() {
    let (url, ctx) = start_test_daemon().await;
    let seed = seed_desk(&ctx).await;

    // Customer opens a ticket
    let resp = ws_rpc(
        &url,
        "ticket.create",
        json!({
            "actor": customer(seed.customer_id),
            "customer_id": seed.customer_id,
            "category_id": seed.category_id,
            "title": "Cannot export invoices",
            "description": "The CSV export button spins forever.",
            "priority": "HIGH"
        }),
    )
    .await;
    assert!(resp.get("error").is_none(), "create error: {:?}", resp);
    let ticket = &resp["result"];
    let ticket_id = ticket["id"].as_i64().unwrap();
    assert_eq!(ticket["status"], "OPEN");
    assert_eq!(ticket["priority"], "HIGH");
    assert!(ticket["agent_id"].is_null());
    let number = ticket["ticket_number"].as_str().unwrap();
    assert!(number.starts_with('T'), "bad ticket number {number}");
    assert_eq!(number.len(), 18);

    // The open ticket shows up on the agent's board as available
    let resp = ws_rpc(&url, "agent.board", json!({ "agent_id": seed.agent_id })).await;
    assert!(resp.get("error").is_none(), "board error: {:?}", resp);
    assert_eq!(resp["result"]["stats"]["available_count"], 1);
    assert_eq!(
        resp["result"]["available_tickets"][0]["id"].as_i64(),
        Some(ticket_id)
    );
    assert!(resp["result"]["assigned_tickets"].as_array().unwrap().is_empty());

    // Agent claims it
    let resp = ws_rpc(
        &url,
        "ticket.claim",
        json!({ "actor": agent(seed.agent_id), "ticket_id": ticket_id }),
    )
    .await;
    assert!(resp.get("error").is_none(), "claim error: {:?}", resp);
    assert_eq!(resp["result"]["status"], "IN_PROGRESS");
    assert_eq!(resp["result"]["agent_id"], seed.agent_id);

    let agent_row = ctx.agents.get(seed.agent_id).await.unwrap().unwrap();
    assert_eq!(agent_row.current_ticket_count, 1);

    // First agent reply stamps the response-time marker
    let resp = ws_rpc(
        &url,
        "ticket.respond",
        json!({
            "actor": agent(seed.agent_id),
            "ticket_id": ticket_id,
            "message": "Looking into the export job now."
        }),
    )
    .await;
    assert!(resp.get("error").is_none(), "respond error: {:?}", resp);
    assert_eq!(resp["result"]["response_type"], "AGENT_REPLY");

    let resp = ws_rpc(
        &url,
        "ticket.get",
        json!({ "actor": customer(seed.customer_id), "ticket_id": ticket_id }),
    )
    .await;
    assert!(resp["result"]["first_response_time"].is_string());

    // Agent resolves
    let resp = ws_rpc(
        &url,
        "ticket.resolve",
        json!({
            "actor": agent(seed.agent_id),
            "ticket_id": ticket_id,
            "resolution": "Re-enabled the export job."
        }),
    )
    .await;
    assert!(resp.get("error").is_none(), "resolve error: {:?}", resp);
    let resolved = &resp["result"];
    assert_eq!(resolved["status"], "RESOLVED");
    assert_eq!(resolved["resolution"], "Re-enabled the export job.");
    assert!(resolved["actual_resolution_time"].is_string());
    assert!(resolved["closed_at"].is_string());

    // Resolving frees the agent slot
    let agent_row = ctx.agents.get(seed.agent_id).await.unwrap().unwrap();
    assert_eq!(agent_row.current_ticket_count, 0);

    // The board counts the resolution toward today and holds no tickets
    let resp = ws_rpc(&url, "agent.board", json!({ "agent_id": seed.agent_id })).await;
    assert!(resp.get("error").is_none(), "board error: {:?}", resp);
    let board = &resp["result"];
    assert_eq!(board["stats"]["resolved_today"], 1);
    assert_eq!(board["stats"]["assigned_count"], 0);
    assert!(board["assigned_tickets"].as_array().unwrap().is_empty());
    assert!(board["available_tickets"].as_array().unwrap().is_empty());

    // Customer reviews the finished ticket
    let resp = ws_rpc(
        &url,
        "review.create",
        json!({
            "actor": customer(seed.customer_id),
            "ticket_id": ticket_id,
            "rating": 5,
            "would_recommend": true,
            "comment": "Fast fix, thanks!"
        }),
    )
    .await;
    assert!(resp.get("error").is_none(), "review error: {:?}", resp);
    assert_eq!(resp["result"]["rating"], 5);
    // Reviews start unpublished until a moderator approves them
    assert_eq!(resp["result"]["is_published"], false);

    // The rollup sees all of it
    let resp = ws_rpc(
        &url,
        "insights.company",
        json!({ "company_id": seed.company_id }),
    )
    .await;
    assert!(resp.get("error").is_none(), "insights error: {:?}", resp);
    let summary = &resp["result"]["summary"];
    assert_eq!(summary["total_tickets"], 1);
    assert_eq!(summary["active_tickets"], 0);
    assert_eq!(summary["closed_tickets"], 1);
    assert_eq!(summary["average_review_rating"], 5.0);
    assert_eq!(resp["result"]["reviews"]["total_reviews"], 1);
    assert_eq!(resp["result"]["agents"][0]["resolved"], 1);
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let (url, ctx) = start_test_daemon().await;
    let seed = seed_desk(&ctx).await;
    let rival = ctx
        .agents
        .register_agent(&RegisterAgent {
            company_id: seed.company_id,
            name: "Kim Reyes".to_string(),
            email: "kim@acme.test".to_string(),
            department: None,
            specialization: None,
            max_concurrent_tickets: Some(5),
            shift_start: None,
            shift_end: None,
            working_days: None,
        })
        .await
        .unwrap();

    let resp = ws_rpc(
        &url,
        "ticket.create",
        json!({
            "actor": customer(seed.customer_id),
            "customer_id": seed.customer_id,
            "title": "Login loop",
            "description": "Password reset bounces back to the login page."
        }),
    )
    .await;
    let ticket_id = resp["result"]["id"].as_i64().unwrap();

    let (a, b) = tokio::join!(
        ws_rpc(
            &url,
            "ticket.claim",
            json!({ "actor": agent(seed.agent_id), "ticket_id": ticket_id }),
        ),
        ws_rpc(
            &url,
            "ticket.claim",
            json!({ "actor": agent(rival.id), "ticket_id": ticket_id }),
        ),
    );

    let winners: Vec<&Value> = [&a, &b]
        .into_iter()
        .filter(|r| r.get("error").is_none())
        .collect();
    let losers: Vec<&Value> = [&a, &b]
        .into_iter()
        .filter(|r| r.get("error").is_some())
        .collect();
    assert_eq!(winners.len(), 1, "exactly one claim must win: {a:?} {b:?}");
    assert_eq!(losers.len(), 1);
    assert_eq!(winners[0]["result"]["status"], "IN_PROGRESS");
    assert_eq!(losers[0]["error"]["code"], -32004);

    // Only the winner holds a slot
    let held_a = ctx.agents.get(seed.agent_id).await.unwrap().unwrap();
    let held_b = ctx.agents.get(rival.id).await.unwrap().unwrap();
    assert_eq!(held_a.current_ticket_count + held_b.current_ticket_count, 1);
}

#[tokio::test]
async fn test_reclaim_by_holder_reports_already_claimed() {
    let (url, ctx) = start_test_daemon().await;
    let seed = seed_desk(&ctx).await;

    let resp = ws_rpc(
        &url,
        "ticket.create",
        json!({
            "actor": customer(seed.customer_id),
            "customer_id": seed.customer_id,
            "title": "Broken link",
            "description": "Docs link 404s."
        }),
    )
    .await;
    let ticket_id = resp["result"]["id"].as_i64().unwrap();

    let first = ws_rpc(
        &url,
        "ticket.claim",
        json!({ "actor": agent(seed.agent_id), "ticket_id": ticket_id }),
    )
    .await;
    assert!(first.get("error").is_none());

    // Claiming a ticket that already left OPEN is rejected even for the holder
    let second = ws_rpc(
        &url,
        "ticket.claim",
        json!({ "actor": agent(seed.agent_id), "ticket_id": ticket_id }),
    )
    .await;
    assert_eq!(second["error"]["code"], -32004);
}

#[tokio::test]
async fn test_customer_cannot_claim_or_assign() {
    let (url, ctx) = start_test_daemon().await;
    let seed = seed_desk(&ctx).await;

    let resp = ws_rpc(
        &url,
        "ticket.create",
        json!({
            "actor": customer(seed.customer_id),
            "customer_id": seed.customer_id,
            "title": "Slow dashboard",
            "description": "Graphs take 30s to load."
        }),
    )
    .await;
    let ticket_id = resp["result"]["id"].as_i64().unwrap();

    let claim = ws_rpc(
        &url,
        "ticket.claim",
        json!({ "actor": customer(seed.customer_id), "ticket_id": ticket_id }),
    )
    .await;
    assert_eq!(claim["error"]["code"], -32002);

    let assign = ws_rpc(
        &url,
        "ticket.assign",
        json!({
            "actor": customer(seed.customer_id),
            "ticket_id": ticket_id,
            "agent_id": seed.agent_id
        }),
    )
    .await;
    assert_eq!(assign["error"]["code"], -32002);

    // Admin assignment works
    let assign = ws_rpc(
        &url,
        "ticket.assign",
        json!({ "actor": admin(), "ticket_id": ticket_id, "agent_id": seed.agent_id }),
    )
    .await;
    assert!(assign.get("error").is_none(), "{assign:?}");
    assert_eq!(assign["result"]["status"], "IN_PROGRESS");
}

#[tokio::test]
async fn test_auth_gate() {
    let (url, _ctx) = start_daemon_with_token("sekrit-token".to_string()).await;

    // Any first message other than daemon.auth is rejected
    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(Message::Text(
        json!({ "jsonrpc": "2.0", "id": 1, "method": "daemon.ping", "params": {} }).to_string(),
    ))
    .await
    .unwrap();
    let resp = next_response(&mut ws).await;
    assert_eq!(resp["error"]["code"], -32000);

    // Wrong token is rejected
    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(Message::Text(
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "daemon.auth",
            "params": { "token": "wrong" }
        })
        .to_string(),
    ))
    .await
    .unwrap();
    let resp = next_response(&mut ws).await;
    assert_eq!(resp["error"]["code"], -32000);

    // Correct token unlocks the connection
    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(Message::Text(
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "daemon.auth",
            "params": { "token": "sekrit-token" }
        })
        .to_string(),
    ))
    .await
    .unwrap();
    let resp = next_response(&mut ws).await;
    assert_eq!(resp["result"]["authenticated"], true);

    ws.send(Message::Text(
        json!({ "jsonrpc": "2.0", "id": 2, "method": "daemon.ping", "params": {} }).to_string(),
    ))
    .await
    .unwrap();
    let resp = next_response(&mut ws).await;
    assert_eq!(resp["result"]["pong"], true);
}

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_response(ws: &mut Ws) -> Value {
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("id").is_some() {
                return v;
            }
        }
    }
}

#[tokio::test]
async fn test_events_are_broadcast() {
    let (url, ctx) = start_test_daemon().await;
    let seed = seed_desk(&ctx).await;

    // Hold a second connection open to watch notifications
    let (mut watcher, _) = connect_async(&url).await.unwrap();
    // Let the server task reach its event loop before triggering the broadcast
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let resp = ws_rpc(
        &url,
        "ticket.create",
        json!({
            "actor": customer(seed.customer_id),
            "customer_id": seed.customer_id,
            "title": "No sound",
            "description": "Notification chime stopped working."
        }),
    )
    .await;
    assert!(resp.get("error").is_none());

    let deadline = tokio::time::Duration::from_secs(2);
    let event = tokio::time::timeout(deadline, async {
        loop {
            if let Some(Ok(Message::Text(text))) = watcher.next().await {
                let v: Value = serde_json::from_str(&text).unwrap();
                if v["method"] == "ticket.created" {
                    return v;
                }
            }
        }
    })
    .await
    .expect("no ticket.created event within 2s");
    assert_eq!(event["params"]["ticket"]["title"], "No sound");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_url, ctx) = start_test_daemon().await;
    let port = ctx.config.port;

    // Give the server a moment to be ready
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // Use a blocking TCP connection in a spawn_blocking to avoid mixing sync I/O
    let result = tokio::task::spawn_blocking(move || {
        let mut stream = TcpStream::connect(format!("127.0.0.1:{port}"))?;
        stream.write_all(b"GET /health HTTP/1.0\r\nHost: localhost\r\n\r\n")?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        Ok::<String, std::io::Error>(response)
    })
    .await
    .unwrap()
    .expect("TCP connect failed");

    // Extract the JSON body (after the blank line separating headers from body)
    let body = result.split("\r\n\r\n").nth(1).unwrap_or(&result);
    let json: serde_json::Value = serde_json::from_str(body).expect("health body is not JSON");

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime"].is_number());
    assert!(json["active_tickets"].is_number());
    assert!(json["port"].is_number());
}
