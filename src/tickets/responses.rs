// SPDX-License-Identifier: MIT
//! Response recorder.
//!
//! Appends customer/agent responses to a ticket, derives the first-response
//! and response-time metrics, and triggers the IN_PROGRESS transition on
//! agent activity. The response insert and the ticket stamps are one
//! transaction.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::warn;

use crate::agents::workload;
use crate::error::EngineError;
use crate::ipc::event::EventBroadcaster;
use crate::storage::AgentRow;
use crate::tickets::model::{round2, Actor, ActorRole, ResponseRow, ResponseType, TicketRow, TicketStatus};

/// Input for [`ResponseRecorder::add_response`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AddResponse {
    pub ticket_id: i64,
    pub message: String,
    /// Honored for administrative actors only; everyone else gets the type
    /// derived from their role.
    pub response_type: Option<ResponseType>,
    pub is_public: Option<bool>,
    pub attachments: Option<String>,
}

/// Hours between ticket creation and `now`, rounded half-up to 2 decimals.
/// `None` when the stored timestamp does not parse.
fn response_hours(created_at: &str, now: DateTime<Utc>) -> Option<f64> {
    let created = DateTime::parse_from_rfc3339(created_at).ok()?;
    let secs = (now - created.with_timezone(&Utc)).num_seconds();
    Some(round2(secs.max(0) as f64 / 3600.0))
}

#[derive(Clone)]
pub struct ResponseRecorder {
    pool: SqlitePool,
    events: EventBroadcaster,
}

impl ResponseRecorder {
    pub fn new(pool: SqlitePool, events: EventBroadcaster) -> Self {
        Self { pool, events }
    }

    pub async fn add_response(
        &self,
        actor: Actor,
        req: &AddResponse,
    ) -> Result<ResponseRow, EngineError> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(EngineError::Validation("message is required".to_string()));
        }

        let now_dt = Utc::now();
        let now = now_dt.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let ticket: TicketRow = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(req.ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket", req.ticket_id))?;
        let status = ticket.status();

        match actor.role {
            ActorRole::Admin => {}
            ActorRole::Agent => {
                if ticket.agent_id != Some(actor.id) {
                    return Err(EngineError::Forbidden(
                        "only the assigned agent may respond to this ticket".to_string(),
                    ));
                }
                if status.is_terminal() {
                    return Err(EngineError::Forbidden(format!(
                        "cannot respond to a {} ticket",
                        status.as_str()
                    )));
                }
            }
            ActorRole::Customer => {
                if ticket.customer_id != actor.id {
                    return Err(EngineError::Forbidden(
                        "only the ticket's customer may respond to this ticket".to_string(),
                    ));
                }
                if status.is_terminal() {
                    return Err(EngineError::Forbidden(format!(
                        "cannot respond to a {} ticket",
                        status.as_str()
                    )));
                }
            }
        }

        let rtype = match actor.role {
            ActorRole::Customer => ResponseType::CustomerReply,
            ActorRole::Agent => ResponseType::AgentReply,
            ActorRole::Admin => req.response_type.unwrap_or(ResponseType::AgentReply),
        };
        let is_public = req
            .is_public
            .unwrap_or(rtype != ResponseType::InternalNote);
        let hours = response_hours(&ticket.created_at, now_dt);
        if hours.is_none() {
            warn!(ticket_id = ticket.id, created_at = %ticket.created_at, "unparseable ticket creation time; response time not recorded");
        }

        let response_id = sqlx::query(
            "INSERT INTO ticket_responses (ticket_id, author_id, author_role, response_type, message,
                                           attachments, is_public, response_time_hours, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ticket.id)
        .bind(actor.id)
        .bind(actor.role.as_str())
        .bind(rtype.as_str())
        .bind(message)
        .bind(req.attachments.as_deref())
        .bind(is_public)
        .bind(hours)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // First agent reply stamps the ticket; any agent reply while the
        // ticket is OPEN or waiting on the customer puts it back in progress.
        let stamp_first = rtype == ResponseType::AgentReply && ticket.first_response_time.is_none();
        let reactivate = rtype == ResponseType::AgentReply
            && matches!(status, TicketStatus::Open | TicketStatus::PendingCustomer);
        sqlx::query(
            "UPDATE tickets SET
                status = CASE WHEN ? THEN 'IN_PROGRESS' ELSE status END,
                first_response_time = CASE WHEN ? THEN ? ELSE first_response_time END,
                last_activity = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(reactivate)
        .bind(stamp_first)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .bind(ticket.id)
        .execute(&mut *tx)
        .await?;

        if reactivate {
            if let Some(agent) = ticket.agent_id {
                // PENDING_CUSTOMER already counts as active, so this must not
                // double-count; the tracker no-ops when nothing changed.
                workload::on_status_change(&mut *tx, agent, status.occupies_agent(), true, &now)
                    .await?;
            }
        }

        let row: ResponseRow = sqlx::query_as("SELECT * FROM ticket_responses WHERE id = ?")
            .bind(response_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        self.events.broadcast(
            "ticket.response_added",
            json!({ "ticket_id": ticket.id, "response": row }),
        );
        Ok(row)
    }

    /// Edit message/visibility. Restricted to the original author or an
    /// administrative actor; ticket/author/type stay immutable.
    pub async fn update_response(
        &self,
        actor: Actor,
        response_id: i64,
        message: Option<&str>,
        is_public: Option<bool>,
    ) -> Result<ResponseRow, EngineError> {
        let existing = self.get_required(response_id).await?;
        self.ensure_author(actor, &existing)?;
        if let Some(m) = message {
            if m.trim().is_empty() {
                return Err(EngineError::Validation("message is required".to_string()));
            }
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE ticket_responses SET
                message = COALESCE(?, message),
                is_public = COALESCE(?, is_public),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(message.map(str::trim))
        .bind(is_public)
        .bind(&now)
        .bind(response_id)
        .execute(&self.pool)
        .await?;
        self.get_required(response_id).await
    }

    pub async fn delete_response(&self, actor: Actor, response_id: i64) -> Result<(), EngineError> {
        let existing = self.get_required(response_id).await?;
        self.ensure_author(actor, &existing)?;
        sqlx::query("DELETE FROM ticket_responses WHERE id = ?")
            .bind(response_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Responses on a ticket, oldest first. Customers see public responses
    /// of their own tickets; agents of the ticket's company and admins see
    /// everything.
    pub async fn list_responses(
        &self,
        actor: Actor,
        ticket_id: i64,
    ) -> Result<Vec<ResponseRow>, EngineError> {
        let ticket: TicketRow = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket", ticket_id))?;

        let public_only = match actor.role {
            ActorRole::Admin => false,
            ActorRole::Customer => {
                if ticket.customer_id != actor.id {
                    return Err(EngineError::Forbidden(
                        "only the ticket's customer may view its responses".to_string(),
                    ));
                }
                true
            }
            ActorRole::Agent => {
                let agent: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
                    .bind(actor.id)
                    .fetch_optional(&self.pool)
                    .await?;
                match agent {
                    Some(a) if a.company_id == ticket.company_id => false,
                    _ => {
                        return Err(EngineError::Forbidden(
                            "agent does not belong to the ticket's company".to_string(),
                        ))
                    }
                }
            }
        };

        let rows = if public_only {
            sqlx::query_as(
                "SELECT * FROM ticket_responses WHERE ticket_id = ? AND is_public = 1 ORDER BY created_at ASC, id ASC",
            )
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM ticket_responses WHERE ticket_id = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    async fn get_required(&self, id: i64) -> Result<ResponseRow, EngineError> {
        sqlx::query_as("SELECT * FROM ticket_responses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("response", id))
    }

    fn ensure_author(&self, actor: Actor, response: &ResponseRow) -> Result<(), EngineError> {
        if actor.role == ActorRole::Admin {
            return Ok(());
        }
        if response.author_id == actor.id && response.author_role == actor.role.as_str() {
            return Ok(());
        }
        Err(EngineError::Forbidden(
            "only the author may modify this response".to_string(),
        ))
    }
}
