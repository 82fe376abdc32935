// SPDX-License-Identifier: MIT
use crate::error::EngineError;
use crate::tickets::model::{Actor, TicketPriority, TicketStatus};
use crate::tickets::responses::AddResponse;
use crate::tickets::service::{CreateTicket, UpdateTicket};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct CreateParams {
    actor: Actor,
    #[serde(flatten)]
    ticket: CreateTicket,
}

#[derive(Deserialize)]
struct TicketIdParams {
    actor: Actor,
    ticket_id: i64,
}

#[derive(Deserialize)]
struct ListParams {
    actor: Actor,
    company_id: Option<i64>,
    customer_id: Option<i64>,
    agent_id: Option<i64>,
}

#[derive(Deserialize)]
struct UpdateParams {
    actor: Actor,
    ticket_id: i64,
    #[serde(flatten)]
    patch: UpdateTicket,
}

#[derive(Deserialize)]
struct ClaimParams {
    actor: Actor,
    ticket_id: i64,
    agent_id: Option<i64>,
}

#[derive(Deserialize)]
struct AssignParams {
    actor: Actor,
    ticket_id: i64,
    agent_id: i64,
}

#[derive(Deserialize)]
struct StatusParams {
    actor: Actor,
    ticket_id: i64,
    status: TicketStatus,
}

#[derive(Deserialize)]
struct ResolveParams {
    actor: Actor,
    ticket_id: i64,
    resolution: Option<String>,
}

#[derive(Deserialize)]
struct PriorityParams {
    actor: Actor,
    ticket_id: i64,
    priority: TicketPriority,
}

#[derive(Deserialize)]
struct RespondParams {
    actor: Actor,
    #[serde(flatten)]
    response: AddResponse,
}

#[derive(Deserialize)]
struct UpdateResponseParams {
    actor: Actor,
    response_id: i64,
    message: Option<String>,
    is_public: Option<bool>,
}

#[derive(Deserialize)]
struct ResponseIdParams {
    actor: Actor,
    response_id: i64,
}

pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.create_ticket(p.actor, &p.ticket).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: TicketIdParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.get_ticket(p.actor, p.ticket_id).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    let tickets = if let Some(customer_id) = p.customer_id {
        ctx.tickets.list_customer_tickets(p.actor, customer_id).await?
    } else if let Some(agent_id) = p.agent_id {
        ctx.tickets.list_agent_tickets(p.actor, agent_id).await?
    } else if let Some(company_id) = p.company_id {
        ctx.tickets.list_company_tickets(p.actor, company_id).await?
    } else {
        return Err(EngineError::Validation(
            "one of company_id, customer_id or agent_id is required".to_string(),
        )
        .into());
    };
    Ok(json!(tickets))
}

pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.update_ticket(p.actor, p.ticket_id, &p.patch).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn cancel(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: TicketIdParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.cancel_ticket(p.actor, p.ticket_id).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: TicketIdParams = serde_json::from_value(params)?;
    ctx.tickets.delete_ticket(p.actor, p.ticket_id).await?;
    Ok(json!({ "deleted": true }))
}

pub async fn claim(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ClaimParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.claim_ticket(p.actor, p.ticket_id, p.agent_id).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn assign(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: AssignParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.assign_ticket(p.actor, p.ticket_id, p.agent_id).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn status(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: StatusParams = serde_json::from_value(params)?;
    let ticket = ctx.tickets.update_status(p.actor, p.ticket_id, p.status).await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn resolve(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ResolveParams = serde_json::from_value(params)?;
    let ticket = ctx
        .tickets
        .resolve_ticket(p.actor, p.ticket_id, p.resolution.as_deref())
        .await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn priority(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: PriorityParams = serde_json::from_value(params)?;
    let ticket = ctx
        .tickets
        .update_priority(p.actor, p.ticket_id, p.priority)
        .await?;
    Ok(serde_json::to_value(ticket)?)
}

pub async fn respond(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: RespondParams = serde_json::from_value(params)?;
    let response = ctx.responses.add_response(p.actor, &p.response).await?;
    Ok(serde_json::to_value(response)?)
}

pub async fn responses(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: TicketIdParams = serde_json::from_value(params)?;
    let responses = ctx.responses.list_responses(p.actor, p.ticket_id).await?;
    Ok(json!(responses))
}

pub async fn update_response(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateResponseParams = serde_json::from_value(params)?;
    let response = ctx
        .responses
        .update_response(p.actor, p.response_id, p.message.as_deref(), p.is_public)
        .await?;
    Ok(serde_json::to_value(response)?)
}

pub async fn delete_response(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ResponseIdParams = serde_json::from_value(params)?;
    ctx.responses.delete_response(p.actor, p.response_id).await?;
    Ok(json!({ "deleted": true }))
}
