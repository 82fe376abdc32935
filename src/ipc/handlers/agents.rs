// SPDX-License-Identifier: MIT
use crate::agents::RegisterAgent;
use crate::error::EngineError;
use crate::tickets::model::{Actor, ActorRole};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct RegisterParams {
    actor: Actor,
    #[serde(flatten)]
    agent: RegisterAgent,
}

#[derive(Deserialize)]
struct AvailabilityParams {
    actor: Actor,
    agent_id: i64,
    available: bool,
}

#[derive(Deserialize)]
struct AgentIdParams {
    agent_id: i64,
}

#[derive(Deserialize)]
struct CompanyIdParams {
    company_id: i64,
}

pub async fn register(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: RegisterParams = serde_json::from_value(params)?;
    if p.actor.role != ActorRole::Admin {
        return Err(EngineError::Forbidden(
            "only administrators may register agents".to_string(),
        )
        .into());
    }
    let agent = ctx.agents.register_agent(&p.agent).await?;
    Ok(serde_json::to_value(agent)?)
}

pub async fn availability(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: AvailabilityParams = serde_json::from_value(params)?;
    let allowed = match p.actor.role {
        ActorRole::Admin => true,
        ActorRole::Agent => p.actor.id == p.agent_id,
        ActorRole::Customer => false,
    };
    if !allowed {
        return Err(EngineError::Forbidden(
            "agents may only change their own availability".to_string(),
        )
        .into());
    }
    let agent = ctx.agents.set_availability(p.agent_id, p.available).await?;
    Ok(serde_json::to_value(agent)?)
}

pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: AgentIdParams = serde_json::from_value(params)?;
    let agent = ctx.agents.get_required(p.agent_id).await?;
    Ok(serde_json::to_value(agent)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CompanyIdParams = serde_json::from_value(params)?;
    let agents = ctx.agents.list_by_company(p.company_id).await?;
    Ok(json!(agents))
}

pub async fn board(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: AgentIdParams = serde_json::from_value(params)?;
    let board = ctx.board.board(p.agent_id).await?;
    Ok(serde_json::to_value(board)?)
}

pub async fn performance(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: AgentIdParams = serde_json::from_value(params)?;
    let perf = ctx.board.performance(p.agent_id).await?;
    Ok(serde_json::to_value(perf)?)
}
