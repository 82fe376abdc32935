// SPDX-License-Identifier: MIT
//! Ticket engine entry points.
//!
//! Role and ownership guards live here; state-dependent guards are enforced
//! inside the store's transactional flows. Notifications go out after the
//! commit and never fail the operation.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::ipc::event::EventBroadcaster;
use crate::tickets::model::{
    Actor, ActorRole, TicketPriority, TicketRow, TicketSource, TicketStatus,
};
use crate::tickets::number;
use crate::tickets::storage::{NewTicket, TicketPatch, TicketStore};

/// Input for [`TicketEngine::create_ticket`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateTicket {
    pub customer_id: i64,
    /// Optional cross-check; must match the customer's company when given.
    pub company_id: Option<i64>,
    pub category_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub priority: Option<TicketPriority>,
    pub source: Option<TicketSource>,
    pub tags: Option<Vec<String>>,
    pub attachments: Option<Vec<String>>,
}

/// Customer edit of an OPEN, unassigned ticket.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateTicket {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub category_id: Option<i64>,
    pub tags: Option<Vec<String>>,
}

fn to_json_list(items: &Option<Vec<String>>) -> Option<String> {
    items
        .as_ref()
        .and_then(|list| serde_json::to_string(list).ok())
}

#[derive(Clone)]
pub struct TicketEngine {
    store: TicketStore,
    events: EventBroadcaster,
    number_attempts: u32,
}

impl TicketEngine {
    pub fn new(pool: SqlitePool, events: EventBroadcaster, number_attempts: u32) -> Self {
        Self {
            store: TicketStore::new(pool),
            events,
            number_attempts,
        }
    }

    /// Shared low-level store, used by read-only views.
    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    // ─── Creation ───────────────────────────────────────────────────────────

    pub async fn create_ticket(
        &self,
        actor: Actor,
        req: &CreateTicket,
    ) -> Result<TicketRow, EngineError> {
        match actor.role {
            ActorRole::Customer if req.customer_id != actor.id => {
                return Err(EngineError::Forbidden(
                    "customers may only open tickets for themselves".to_string(),
                ))
            }
            ActorRole::Agent => {
                return Err(EngineError::Forbidden(
                    "agents cannot open tickets".to_string(),
                ))
            }
            _ => {}
        }

        let title = req.title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("title is required".to_string()));
        }
        let description = req.description.trim();
        if description.is_empty() {
            return Err(EngineError::Validation(
                "description is required".to_string(),
            ));
        }

        let customer = self
            .store
            .get_customer(req.customer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("customer", req.customer_id))?;
        if let Some(company_id) = req.company_id {
            if company_id != customer.company_id {
                return Err(EngineError::Validation(format!(
                    "customer {} does not belong to company {}",
                    customer.id, company_id
                )));
            }
        }

        let mut allocated = None;
        for _ in 0..self.number_attempts.max(1) {
            let candidate =
                number::ticket_number(customer.company_id, Utc::now(), number::random_suffix());
            if !self.store.exists_by_number(&candidate).await? {
                allocated = Some(candidate);
                break;
            }
        }
        let ticket_number = allocated.ok_or_else(|| {
            EngineError::Conflict("could not allocate a unique ticket number".to_string())
        })?;

        let ticket = self
            .store
            .create(&NewTicket {
                number: ticket_number,
                company_id: customer.company_id,
                customer_id: customer.id,
                category_id: req.category_id,
                title: title.to_string(),
                description: description.to_string(),
                priority: req.priority.unwrap_or(TicketPriority::Medium),
                source: req.source.unwrap_or(TicketSource::Web),
                tags: to_json_list(&req.tags),
                attachments: to_json_list(&req.attachments),
            })
            .await?;
        info!(ticket_id = ticket.id, number = %ticket.ticket_number, "ticket created");

        let agent_emails = match self.store.available_agent_emails(ticket.company_id).await {
            Ok(emails) => emails,
            Err(e) => {
                warn!(err = %e, "agent email lookup failed; notifying without recipients");
                Vec::new()
            }
        };
        self.events.broadcast(
            "ticket.created",
            json!({ "ticket": ticket, "agent_emails": agent_emails }),
        );
        Ok(ticket)
    }

    // ─── Customer operations ────────────────────────────────────────────────

    pub async fn update_ticket(
        &self,
        actor: Actor,
        ticket_id: i64,
        req: &UpdateTicket,
    ) -> Result<TicketRow, EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_customer_or_admin(actor, &ticket)?;

        if let Some(t) = &req.title {
            if t.trim().is_empty() {
                return Err(EngineError::Validation("title is required".to_string()));
            }
        }
        if let Some(d) = &req.description {
            if d.trim().is_empty() {
                return Err(EngineError::Validation(
                    "description is required".to_string(),
                ));
            }
        }

        self.store
            .update_if_editable(
                ticket_id,
                &TicketPatch {
                    title: req.title.as_ref().map(|t| t.trim().to_string()),
                    description: req.description.as_ref().map(|d| d.trim().to_string()),
                    priority: req.priority,
                    category_id: req.category_id,
                    tags: to_json_list(&req.tags),
                },
            )
            .await
    }

    pub async fn cancel_ticket(&self, actor: Actor, ticket_id: i64) -> Result<TicketRow, EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_customer_or_admin(actor, &ticket)?;
        let updated = self
            .store
            .transition(ticket_id, TicketStatus::Cancelled, None)
            .await?;
        self.broadcast_status(&updated);
        Ok(updated)
    }

    pub async fn delete_ticket(&self, actor: Actor, ticket_id: i64) -> Result<(), EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_customer_or_admin(actor, &ticket)?;
        self.store
            .delete_open_unassigned(ticket_id, ticket.customer_id)
            .await?;
        info!(ticket_id, "ticket deleted");
        Ok(())
    }

    // ─── Agent operations ───────────────────────────────────────────────────

    pub async fn update_status(
        &self,
        actor: Actor,
        ticket_id: i64,
        to: TicketStatus,
    ) -> Result<TicketRow, EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_assigned_agent_or_admin(actor, &ticket)?;
        let updated = self.store.transition(ticket_id, to, None).await?;
        self.broadcast_status(&updated);
        Ok(updated)
    }

    pub async fn resolve_ticket(
        &self,
        actor: Actor,
        ticket_id: i64,
        resolution: Option<&str>,
    ) -> Result<TicketRow, EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_assigned_agent_or_admin(actor, &ticket)?;
        let resolution = resolution.map(str::trim).filter(|r| !r.is_empty());
        let updated = self
            .store
            .transition(ticket_id, TicketStatus::Resolved, resolution)
            .await?;
        self.broadcast_status(&updated);
        Ok(updated)
    }

    pub async fn update_priority(
        &self,
        actor: Actor,
        ticket_id: i64,
        priority: TicketPriority,
    ) -> Result<TicketRow, EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_assigned_agent_or_admin(actor, &ticket)?;
        self.store.update_priority(ticket_id, priority).await
    }

    // ─── Assignment protocol ────────────────────────────────────────────────

    pub async fn assign_ticket(
        &self,
        actor: Actor,
        ticket_id: i64,
        agent_id: i64,
    ) -> Result<TicketRow, EngineError> {
        if actor.role != ActorRole::Admin {
            return Err(EngineError::Forbidden(
                "only administrators may assign tickets".to_string(),
            ));
        }
        let (ticket, agent_changed) = self.store.assign(ticket_id, agent_id).await?;
        info!(ticket_id, agent_id, "ticket assigned");
        if agent_changed {
            self.notify_ownership("ticket.assigned", &ticket, agent_id).await;
        } else {
            self.broadcast_status(&ticket);
        }
        Ok(ticket)
    }

    pub async fn claim_ticket(
        &self,
        actor: Actor,
        ticket_id: i64,
        agent_id: Option<i64>,
    ) -> Result<TicketRow, EngineError> {
        let agent_id = match actor.role {
            ActorRole::Agent => match agent_id {
                Some(id) if id != actor.id => {
                    return Err(EngineError::Forbidden(
                        "agents may only claim tickets for themselves".to_string(),
                    ))
                }
                _ => actor.id,
            },
            ActorRole::Admin => agent_id.ok_or_else(|| {
                EngineError::Validation("agent_id is required".to_string())
            })?,
            ActorRole::Customer => {
                return Err(EngineError::Forbidden(
                    "customers cannot claim tickets".to_string(),
                ))
            }
        };
        let ticket = self.store.claim(ticket_id, agent_id).await?;
        info!(ticket_id, agent_id, "ticket claimed");
        self.notify_ownership("ticket.claimed", &ticket, agent_id).await;
        Ok(ticket)
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub async fn get_ticket(&self, actor: Actor, ticket_id: i64) -> Result<TicketRow, EngineError> {
        let ticket = self.store.get_required(ticket_id).await?;
        self.ensure_can_view(actor, &ticket).await?;
        Ok(ticket)
    }

    pub async fn list_company_tickets(
        &self,
        actor: Actor,
        company_id: i64,
    ) -> Result<Vec<TicketRow>, EngineError> {
        match actor.role {
            ActorRole::Admin => {}
            ActorRole::Agent => {
                let agent = self
                    .store
                    .get_agent(actor.id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("agent", actor.id))?;
                if agent.company_id != company_id {
                    return Err(EngineError::Forbidden(
                        "agent does not belong to this company".to_string(),
                    ));
                }
            }
            ActorRole::Customer => {
                return Err(EngineError::Forbidden(
                    "customers cannot list company tickets".to_string(),
                ))
            }
        }
        self.store.list_by_company(company_id).await
    }

    pub async fn list_customer_tickets(
        &self,
        actor: Actor,
        customer_id: i64,
    ) -> Result<Vec<TicketRow>, EngineError> {
        if actor.role == ActorRole::Customer && actor.id != customer_id {
            return Err(EngineError::Forbidden(
                "customers may only list their own tickets".to_string(),
            ));
        }
        self.store.list_by_customer(customer_id).await
    }

    pub async fn list_agent_tickets(
        &self,
        actor: Actor,
        agent_id: i64,
    ) -> Result<Vec<TicketRow>, EngineError> {
        match actor.role {
            ActorRole::Admin => {}
            ActorRole::Agent if actor.id == agent_id => {}
            _ => {
                return Err(EngineError::Forbidden(
                    "agents may only list their own queue".to_string(),
                ))
            }
        }
        self.store.list_by_agent(agent_id).await
    }

    // ─── Guards & notifications ─────────────────────────────────────────────

    fn ensure_customer_or_admin(&self, actor: Actor, ticket: &TicketRow) -> Result<(), EngineError> {
        match actor.role {
            ActorRole::Admin => Ok(()),
            ActorRole::Customer if ticket.customer_id == actor.id => Ok(()),
            ActorRole::Customer => Err(EngineError::Forbidden(
                "only the ticket's customer may do this".to_string(),
            )),
            ActorRole::Agent => Err(EngineError::Forbidden(
                "this is a customer operation".to_string(),
            )),
        }
    }

    fn ensure_assigned_agent_or_admin(
        &self,
        actor: Actor,
        ticket: &TicketRow,
    ) -> Result<(), EngineError> {
        match actor.role {
            ActorRole::Admin => Ok(()),
            ActorRole::Agent if ticket.agent_id == Some(actor.id) => Ok(()),
            _ => Err(EngineError::Forbidden(
                "only the assigned agent may do this".to_string(),
            )),
        }
    }

    async fn ensure_can_view(&self, actor: Actor, ticket: &TicketRow) -> Result<(), EngineError> {
        match actor.role {
            ActorRole::Admin => Ok(()),
            ActorRole::Customer if ticket.customer_id == actor.id => Ok(()),
            ActorRole::Customer => Err(EngineError::Forbidden(
                "only the ticket's customer may view it".to_string(),
            )),
            ActorRole::Agent => {
                let agent = self
                    .store
                    .get_agent(actor.id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("agent", actor.id))?;
                if agent.company_id == ticket.company_id {
                    Ok(())
                } else {
                    Err(EngineError::Forbidden(
                        "agent does not belong to the ticket's company".to_string(),
                    ))
                }
            }
        }
    }

    fn broadcast_status(&self, ticket: &TicketRow) {
        self.events.broadcast(
            "ticket.status_changed",
            json!({ "ticket_id": ticket.id, "status": ticket.status, "ticket": ticket }),
        );
    }

    /// Ownership-change notification with the customer email and agent name
    /// the external notifier wants. Lookup failures downgrade the payload,
    /// never the operation.
    async fn notify_ownership(&self, event: &str, ticket: &TicketRow, agent_id: i64) {
        let customer_email = match self.store.get_customer(ticket.customer_id).await {
            Ok(Some(c)) => Some(c.email),
            Ok(None) => None,
            Err(e) => {
                warn!(err = %e, "customer lookup for notification failed");
                None
            }
        };
        let agent_name = match self.store.get_agent(agent_id).await {
            Ok(Some(a)) => Some(a.name),
            Ok(None) => None,
            Err(e) => {
                warn!(err = %e, "agent lookup for notification failed");
                None
            }
        };
        self.events.broadcast(
            event,
            json!({
                "ticket": ticket,
                "customer_email": customer_email,
                "agent_name": agent_name,
            }),
        );
    }
}
