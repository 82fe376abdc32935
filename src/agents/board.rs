// SPDX-License-Identifier: MIT

//! Read-only agent views: the per-agent ticket board and the
//! per-agent performance rollup.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::EngineError;
use crate::storage::{with_timeout, AgentRow};
use crate::tickets::model::{parse_ts, round2, TicketRow, TicketStatus};

#[derive(Debug, Clone, Serialize)]
pub struct BoardAgent {
    pub agent_id: i64,
    pub company_id: i64,
    pub name: String,
    pub is_available: bool,
    pub max_concurrent_tickets: i64,
    pub current_ticket_count: i64,
    /// Remaining capacity; `None` when the agent is uncapped.
    pub open_slots: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardStats {
    pub assigned_count: i64,
    pub available_count: i64,
    /// Tickets of this agent whose resolution was stamped today (UTC).
    pub resolved_today: i64,
    pub total_tickets_handled: i64,
    pub average_resolution_hours: Option<f64>,
    pub customer_satisfaction_rating: Option<f64>,
}

/// One-call working view for an agent: the tickets they hold, the tickets
/// they could pick up, and today's throughput.
#[derive(Debug, Clone, Serialize)]
pub struct TicketBoard {
    pub agent: BoardAgent,
    pub assigned_tickets: Vec<TicketRow>,
    pub available_tickets: Vec<TicketRow>,
    pub stats: BoardStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPerformance {
    pub agent_id: i64,
    pub name: String,
    pub assigned_total: i64,
    pub active: i64,
    pub resolved: i64,
    pub cancelled: i64,
    pub average_resolution_hours: Option<f64>,
    pub average_first_response_hours: Option<f64>,
    pub customer_satisfaction_rating: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct PerfRow {
    status: String,
    created_at: String,
    actual_resolution_time: Option<String>,
    first_response_time: Option<String>,
}

/// Partition a company's tickets into the agent's board. `tickets` arrive
/// newest-first and keep that order within each list.
fn build_board(agent: &AgentRow, tickets: Vec<TicketRow>, today: NaiveDate) -> TicketBoard {
    let resolved_today = tickets
        .iter()
        .filter(|t| t.agent_id == Some(agent.id))
        .filter_map(|t| t.actual_resolution_time.as_deref().and_then(parse_ts))
        .filter(|stamp| stamp.date_naive() == today)
        .count() as i64;
    let average_resolution_hours = mean_hours(
        tickets
            .iter()
            .filter(|t| t.agent_id == Some(agent.id))
            .map(|t| (t.created_at.as_str(), t.actual_resolution_time.as_deref())),
    );

    let mut assigned_tickets = Vec::new();
    let mut available_tickets = Vec::new();
    for t in tickets {
        if t.agent_id == Some(agent.id) && t.status().occupies_agent() {
            assigned_tickets.push(t);
        } else if t.agent_id.is_none() && t.status() == TicketStatus::Open {
            available_tickets.push(t);
        }
    }

    let open_slots = (agent.max_concurrent_tickets > 0)
        .then(|| (agent.max_concurrent_tickets - agent.current_ticket_count).max(0));
    TicketBoard {
        agent: BoardAgent {
            agent_id: agent.id,
            company_id: agent.company_id,
            name: agent.name.clone(),
            is_available: agent.is_available,
            max_concurrent_tickets: agent.max_concurrent_tickets,
            current_ticket_count: agent.current_ticket_count,
            open_slots,
        },
        stats: BoardStats {
            assigned_count: assigned_tickets.len() as i64,
            available_count: available_tickets.len() as i64,
            resolved_today,
            total_tickets_handled: agent.total_tickets_handled,
            average_resolution_hours,
            customer_satisfaction_rating: agent.customer_satisfaction_rating,
        },
        assigned_tickets,
        available_tickets,
    }
}

/// Mean of `(later - created_at)` in hours over the rows where `later` is
/// stamped, rounded half-up to 2 decimals.
fn mean_hours<'a>(
    rows: impl Iterator<Item = (&'a str, Option<&'a str>)>,
) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0u32;
    for (created, later) in rows {
        let (Some(created), Some(later)) = (parse_ts(created), later.and_then(parse_ts)) else {
            continue;
        };
        sum += (later - created).num_seconds().max(0) as f64 / 3600.0;
        n += 1;
    }
    (n > 0).then(|| round2(sum / n as f64))
}

fn summarize(agent: &AgentRow, rows: &[PerfRow]) -> AgentPerformance {
    let mut active = 0;
    let mut resolved = 0;
    let mut cancelled = 0;
    for row in rows {
        match TicketStatus::parse(&row.status) {
            Some(s) if s.occupies_agent() => active += 1,
            Some(TicketStatus::Resolved) | Some(TicketStatus::Closed) => resolved += 1,
            Some(TicketStatus::Cancelled) => cancelled += 1,
            _ => {}
        }
    }
    AgentPerformance {
        agent_id: agent.id,
        name: agent.name.clone(),
        assigned_total: rows.len() as i64,
        active,
        resolved,
        cancelled,
        average_resolution_hours: mean_hours(
            rows.iter()
                .map(|r| (r.created_at.as_str(), r.actual_resolution_time.as_deref())),
        ),
        average_first_response_hours: mean_hours(
            rows.iter()
                .map(|r| (r.created_at.as_str(), r.first_response_time.as_deref())),
        ),
        customer_satisfaction_rating: agent.customer_satisfaction_rating,
    }
}

#[derive(Clone)]
pub struct WorkBoard {
    pool: SqlitePool,
}

impl WorkBoard {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ticket board for one agent: active assignments plus the company's
    /// unclaimed OPEN tickets, newest first.
    pub async fn board(&self, agent_id: i64) -> Result<TicketBoard, EngineError> {
        with_timeout(async {
            let agent = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = ?")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| EngineError::not_found("agent", agent_id))?;
            let tickets = sqlx::query_as::<_, TicketRow>(
                "SELECT * FROM tickets WHERE company_id = ? ORDER BY created_at DESC",
            )
            .bind(agent.company_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(build_board(&agent, tickets, Utc::now().date_naive()))
        })
        .await
    }

    pub async fn performance(&self, agent_id: i64) -> Result<AgentPerformance, EngineError> {
        let agent = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("agent", agent_id))?;
        let rows = sqlx::query_as::<_, PerfRow>(
            "SELECT status, created_at, actual_resolution_time, first_response_time
             FROM tickets WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(summarize(&agent, &rows))
    }
}
