// SPDX-License-Identifier: MIT
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let active_tickets = ctx.tickets.store().count_active().await?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "daemon_id": ctx.daemon_id,
        "uptime": uptime,
        "active_tickets": active_tickets,
        "port": ctx.config.port
    }))
}
