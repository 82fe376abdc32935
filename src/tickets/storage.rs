// SPDX-License-Identifier: MIT
//! SQL flows for tickets.
//!
//! Multi-statement flows (claim, assign, create, delete, transition) run in a
//! single transaction so the ticket mutation and the workload/lifetime
//! counters commit or roll back together.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::agents::workload;
use crate::error::EngineError;
use crate::storage::{is_unique_violation, with_timeout, AgentRow, CustomerRow};
use crate::tickets::machine;
use crate::tickets::model::{TicketPriority, TicketRow, TicketStatus};

/// Fields of a new ticket, validated by the service before insertion.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub number: String,
    pub company_id: i64,
    pub customer_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub source: crate::tickets::model::TicketSource,
    pub tags: Option<String>,
    pub attachments: Option<String>,
}

/// Customer-editable fields. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub category_id: Option<i64>,
    pub tags: Option<String>,
}

#[derive(Clone)]
pub struct TicketStore {
    pool: SqlitePool,
}

impl TicketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub async fn get(&self, id: i64) -> Result<Option<TicketRow>, EngineError> {
        Ok(sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_required(&self, id: i64) -> Result<TicketRow, EngineError> {
        self.get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket", id))
    }

    pub async fn exists_by_number(&self, number: &str) -> Result<bool, EngineError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE ticket_number = ?")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 > 0)
    }

    pub async fn list_by_company(&self, company_id: i64) -> Result<Vec<TicketRow>, EngineError> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM tickets WHERE company_id = ? ORDER BY created_at DESC")
                    .bind(company_id)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn list_by_customer(&self, customer_id: i64) -> Result<Vec<TicketRow>, EngineError> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM tickets WHERE customer_id = ? ORDER BY created_at DESC")
                    .bind(customer_id)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn list_by_agent(&self, agent_id: i64) -> Result<Vec<TicketRow>, EngineError> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM tickets WHERE agent_id = ? ORDER BY created_at DESC")
                    .bind(agent_id)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    /// Tickets not yet in a terminal or resolved state, across all companies.
    pub async fn count_active(&self) -> Result<i64, EngineError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tickets WHERE status IN ('OPEN', 'IN_PROGRESS', 'PENDING_CUSTOMER')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn get_customer(&self, id: i64) -> Result<Option<CustomerRow>, EngineError> {
        Ok(sqlx::query_as("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_agent(&self, id: i64) -> Result<Option<AgentRow>, EngineError> {
        Ok(sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Emails of the company's available agents, for new-ticket notifications.
    pub async fn available_agent_emails(&self, company_id: i64) -> Result<Vec<String>, EngineError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT email FROM agents WHERE company_id = ? AND is_available = 1")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }

    // ─── Create / delete ────────────────────────────────────────────────────

    /// Insert a ticket and bump the owning customer's lifetime counter in the
    /// same transaction.
    pub async fn create(&self, t: &NewTicket) -> Result<TicketRow, EngineError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO tickets (ticket_number, company_id, customer_id, category_id, title, description,
                                  status, priority, source, tags, attachments, last_activity, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 'OPEN', ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&t.number)
        .bind(t.company_id)
        .bind(t.customer_id)
        .bind(t.category_id)
        .bind(&t.title)
        .bind(&t.description)
        .bind(t.priority.as_str())
        .bind(t.source.as_str())
        .bind(t.tags.as_deref())
        .bind(t.attachments.as_deref())
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(r) => r.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Err(EngineError::Conflict(format!(
                    "ticket number {} already exists",
                    t.number
                )));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query("UPDATE customers SET total_tickets = total_tickets + 1 WHERE id = ?")
            .bind(t.customer_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Customer-initiated hard delete. Only unassigned OPEN tickets qualify;
    /// the owner's lifetime counter is decremented in the same transaction.
    pub async fn delete_open_unassigned(
        &self,
        ticket_id: i64,
        customer_id: i64,
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM ticket_responses WHERE ticket_id = ?")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM tickets WHERE id = ? AND status = 'OPEN' AND agent_id IS NULL")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        if !deleted {
            tx.rollback().await?;
            return Err(match self.get(ticket_id).await? {
                None => EngineError::not_found("ticket", ticket_id),
                Some(t) => EngineError::InvalidTransition(format!(
                    "only unassigned OPEN tickets can be deleted; ticket {} is {}",
                    ticket_id, t.status
                )),
            });
        }
        sqlx::query("UPDATE customers SET total_tickets = MAX(0, total_tickets - 1) WHERE id = ?")
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ─── Assignment protocol ────────────────────────────────────────────────

    /// Self-service claim. The status check and the ownership write are one
    /// conditional update, so of two concurrent claims exactly one wins.
    pub async fn claim(&self, ticket_id: i64, agent_id: i64) -> Result<TicketRow, EngineError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // OPEN tickets only. Re-claiming an OPEN ticket already tagged with
        // the same agent is permitted (OPEN tickets are not counted yet).
        let won = sqlx::query(
            "UPDATE tickets
             SET agent_id = ?, status = 'IN_PROGRESS', last_activity = ?, updated_at = ?
             WHERE id = ? AND status = 'OPEN' AND (agent_id IS NULL OR agent_id = ?)",
        )
        .bind(agent_id)
        .bind(&now)
        .bind(&now)
        .bind(ticket_id)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !won {
            tx.rollback().await?;
            return Err(self.classify_claim_failure(ticket_id).await?);
        }

        let ticket: TicketRow = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(&mut *tx)
            .await?;
        let agent: AgentRow = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("agent", agent_id))?;
        if agent.company_id != ticket.company_id {
            tx.rollback().await?;
            return Err(EngineError::Forbidden(format!(
                "agent {} does not belong to company {}",
                agent_id, ticket.company_id
            )));
        }

        if !workload::reserve_slot(&mut *tx, agent_id, &now).await? {
            tx.rollback().await?;
            return Err(EngineError::CapacityExceeded {
                agent_id,
                current: agent.current_ticket_count,
                max: agent.max_concurrent_tickets,
            });
        }

        tx.commit().await?;
        Ok(ticket)
    }

    async fn classify_claim_failure(&self, ticket_id: i64) -> Result<EngineError, EngineError> {
        Ok(match self.get(ticket_id).await? {
            None => EngineError::not_found("ticket", ticket_id),
            Some(t) => match t.agent_id {
                Some(holder) => EngineError::AlreadyClaimed {
                    ticket_id,
                    agent_id: holder,
                },
                None => EngineError::InvalidTransition(format!(
                    "only OPEN tickets can be claimed; ticket {} is {}",
                    ticket_id, t.status
                )),
            },
        })
    }

    /// Administrative assignment. Any prior status is accepted; the ticket is
    /// (re)activated as IN_PROGRESS under the target agent. Returns the
    /// updated row and whether the agent reference changed.
    pub async fn assign(
        &self,
        ticket_id: i64,
        agent_id: i64,
    ) -> Result<(TicketRow, bool), EngineError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let ticket: TicketRow = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket", ticket_id))?;
        let agent: AgentRow = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("agent", agent_id))?;
        if agent.company_id != ticket.company_id {
            return Err(EngineError::Forbidden(format!(
                "agent {} does not belong to company {}",
                agent_id, ticket.company_id
            )));
        }
        if agent.max_concurrent_tickets > 0
            && agent.current_ticket_count >= agent.max_concurrent_tickets
        {
            return Err(EngineError::CapacityExceeded {
                agent_id,
                current: agent.current_ticket_count,
                max: agent.max_concurrent_tickets,
            });
        }

        let was_active = ticket.status().occupies_agent();
        let agent_changed = ticket.agent_id != Some(agent_id);
        if agent_changed {
            if let Some(prev) = ticket.agent_id {
                if was_active {
                    workload::release_slot(&mut *tx, prev, &now).await?;
                }
            }
            if !workload::reserve_slot(&mut *tx, agent_id, &now).await? {
                return Err(EngineError::CapacityExceeded {
                    agent_id,
                    current: agent.current_ticket_count,
                    max: agent.max_concurrent_tickets,
                });
            }
        } else if !was_active {
            // Same agent, inactive ticket: reactivation takes a slot again.
            if !workload::reserve_slot(&mut *tx, agent_id, &now).await? {
                return Err(EngineError::CapacityExceeded {
                    agent_id,
                    current: agent.current_ticket_count,
                    max: agent.max_concurrent_tickets,
                });
            }
        }

        sqlx::query(
            "UPDATE tickets SET agent_id = ?, status = 'IN_PROGRESS', last_activity = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(agent_id)
        .bind(&now)
        .bind(&now)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((updated, agent_changed))
    }

    // ─── Status changes ─────────────────────────────────────────────────────

    /// Apply a validated lifecycle transition with its timestamp side effects
    /// and the matching workload adjustment.
    pub async fn transition(
        &self,
        ticket_id: i64,
        to: TicketStatus,
        resolution: Option<&str>,
    ) -> Result<TicketRow, EngineError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let ticket: TicketRow = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket", ticket_id))?;
        let from = ticket.status();
        machine::ensure(from, to)?;

        let stamp_resolution = matches!(to, TicketStatus::Resolved | TicketStatus::Closed);
        let stamp_closed = stamp_resolution || to == TicketStatus::Cancelled;
        sqlx::query(
            "UPDATE tickets SET
                status = ?,
                resolution = COALESCE(?, resolution),
                actual_resolution_time = CASE WHEN ? THEN COALESCE(actual_resolution_time, ?) ELSE actual_resolution_time END,
                closed_at = CASE WHEN ? THEN COALESCE(closed_at, ?) ELSE closed_at END,
                last_activity = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(to.as_str())
        .bind(resolution)
        .bind(stamp_resolution)
        .bind(&now)
        .bind(stamp_closed)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

        if let Some(agent) = ticket.agent_id {
            workload::on_status_change(
                &mut *tx,
                agent,
                from.occupies_agent(),
                to.occupies_agent(),
                &now,
            )
            .await?;
        }

        let updated = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(updated)
    }

    // ─── Customer edit ──────────────────────────────────────────────────────

    /// Apply a customer edit. Permitted only while the ticket is OPEN and
    /// unassigned; the guard is part of the update statement.
    pub async fn update_if_editable(
        &self,
        ticket_id: i64,
        patch: &TicketPatch,
    ) -> Result<TicketRow, EngineError> {
        let now = Utc::now().to_rfc3339();
        let updated = sqlx::query(
            "UPDATE tickets SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                priority = COALESCE(?, priority),
                category_id = COALESCE(?, category_id),
                tags = COALESCE(?, tags),
                updated_at = ?
             WHERE id = ? AND status = 'OPEN' AND agent_id IS NULL",
        )
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.priority.map(|p| p.as_str()))
        .bind(patch.category_id)
        .bind(patch.tags.as_deref())
        .bind(&now)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if !updated {
            return Err(match self.get(ticket_id).await? {
                None => EngineError::not_found("ticket", ticket_id),
                Some(t) => EngineError::InvalidTransition(format!(
                    "ticket {} is no longer editable ({})",
                    ticket_id, t.status
                )),
            });
        }
        self.get_required(ticket_id).await
    }

    /// Priority change by the assigned agent. Unlike the customer edit this
    /// is allowed while the ticket is being worked.
    pub async fn update_priority(
        &self,
        ticket_id: i64,
        priority: TicketPriority,
    ) -> Result<TicketRow, EngineError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tickets SET priority = ?, last_activity = ?, updated_at = ? WHERE id = ?")
            .bind(priority.as_str())
            .bind(&now)
            .bind(&now)
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        self.get_required(ticket_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::model::TicketSource;

    async fn test_store() -> TicketStore {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        for sql in [
            include_str!("../storage/migrations/001_init.sql"),
            include_str!("../storage/migrations/002_reviews.sql"),
        ] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if stmt.is_empty() {
                    continue;
                }
                sqlx::query(stmt).execute(&pool).await.unwrap();
            }
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO companies (name, subscription_plan, created_at) VALUES ('Acme', 'BASIC', ?)")
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO customers (company_id, name, email, customer_type, preferred_contact_method, total_tickets, created_at)
             VALUES (1, 'Casey', 'casey@acme.test', 'INDIVIDUAL', 'EMAIL', 0, ?)",
        )
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();
        TicketStore::new(pool)
    }

    async fn seed_agent(store: &TicketStore, max: i64) -> i64 {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO agents (company_id, name, email, max_concurrent_tickets, current_ticket_count, created_at, updated_at)
             VALUES (1, 'Sam', 'sam@acme.test', ?, 0, ?, ?)",
        )
        .bind(max)
        .bind(&now)
        .bind(&now)
        .execute(&store.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn new_ticket(number: &str) -> NewTicket {
        NewTicket {
            number: number.to_string(),
            company_id: 1,
            customer_id: 1,
            category_id: None,
            title: "Printer on fire".to_string(),
            description: "It is very much on fire.".to_string(),
            priority: TicketPriority::Medium,
            source: TicketSource::Web,
            tags: None,
            attachments: None,
        }
    }

    async fn agent_count(store: &TicketStore, id: i64) -> i64 {
        store.get_agent(id).await.unwrap().unwrap().current_ticket_count
    }

    #[tokio::test]
    async fn create_bumps_customer_counter() {
        let store = test_store().await;
        let t = store.create(&new_ticket("T0101010101010001")).await.unwrap();
        assert_eq!(t.status, "OPEN");
        assert!(t.agent_id.is_none());
        let c = store.get_customer(1).await.unwrap().unwrap();
        assert_eq!(c.total_tickets, 1);
    }

    #[tokio::test]
    async fn duplicate_number_is_a_conflict() {
        let store = test_store().await;
        store.create(&new_ticket("T0101010101010002")).await.unwrap();
        let err = store.create(&new_ticket("T0101010101010002")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");
        // The counter bump rolled back with the insert.
        let c = store.get_customer(1).await.unwrap().unwrap();
        assert_eq!(c.total_tickets, 1);
    }

    #[tokio::test]
    async fn claim_takes_ownership_and_a_slot() {
        let store = test_store().await;
        let agent = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010003")).await.unwrap();

        let claimed = store.claim(t.id, agent).await.unwrap();
        assert_eq!(claimed.status, "IN_PROGRESS");
        assert_eq!(claimed.agent_id, Some(agent));
        assert_eq!(agent_count(&store, agent).await, 1);
    }

    #[tokio::test]
    async fn second_claim_loses_with_already_claimed() {
        let store = test_store().await;
        let first = seed_agent(&store, 5).await;
        let second = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010004")).await.unwrap();

        store.claim(t.id, first).await.unwrap();
        let err = store.claim(t.id, second).await.unwrap_err();
        match err {
            EngineError::AlreadyClaimed { agent_id, .. } => assert_eq!(agent_id, first),
            other => panic!("expected AlreadyClaimed, got {other:?}"),
        }
        // Loser took no slot.
        assert_eq!(agent_count(&store, second).await, 0);
    }

    #[tokio::test]
    async fn reclaim_by_owner_is_rejected_once_in_progress() {
        let store = test_store().await;
        let agent = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010005")).await.unwrap();

        store.claim(t.id, agent).await.unwrap();
        let err = store.claim(t.id, agent).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyClaimed { .. }), "{err:?}");
        // No double count either.
        assert_eq!(agent_count(&store, agent).await, 1);
    }

    #[tokio::test]
    async fn claim_at_capacity_rolls_back_the_ticket() {
        let store = test_store().await;
        let agent = seed_agent(&store, 1).await;
        let first = store.create(&new_ticket("T0101010101010006")).await.unwrap();
        let second = store.create(&new_ticket("T0101010101010007")).await.unwrap();

        store.claim(first.id, agent).await.unwrap();
        let err = store.claim(second.id, agent).await.unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { current: 1, max: 1, .. }), "{err:?}");

        // The losing claim left no trace.
        let untouched = store.get_required(second.id).await.unwrap();
        assert_eq!(untouched.status, "OPEN");
        assert!(untouched.agent_id.is_none());
        assert_eq!(agent_count(&store, agent).await, 1);
    }

    #[tokio::test]
    async fn claim_of_cancelled_unassigned_ticket_is_invalid_transition() {
        let store = test_store().await;
        let agent = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010008")).await.unwrap();
        store.transition(t.id, TicketStatus::Cancelled, None).await.unwrap();

        let err = store.claim(t.id, agent).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)), "{err:?}");
    }

    #[tokio::test]
    async fn reassignment_moves_the_slot() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let b = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010009")).await.unwrap();

        store.claim(t.id, a).await.unwrap();
        let (updated, changed) = store.assign(t.id, b).await.unwrap();
        assert!(changed);
        assert_eq!(updated.agent_id, Some(b));
        assert_eq!(agent_count(&store, a).await, 0);
        assert_eq!(agent_count(&store, b).await, 1);
    }

    #[tokio::test]
    async fn rejected_reassignment_leaves_previous_agent_counted() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let b = seed_agent(&store, 1).await;
        let blocker = store.create(&new_ticket("T0101010101010010")).await.unwrap();
        let t = store.create(&new_ticket("T0101010101010011")).await.unwrap();

        store.claim(blocker.id, b).await.unwrap();
        store.claim(t.id, a).await.unwrap();

        let err = store.assign(t.id, b).await.unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { .. }), "{err:?}");
        // No partial decrement of the previous agent.
        assert_eq!(agent_count(&store, a).await, 1);
        assert_eq!(agent_count(&store, b).await, 1);
        let unchanged = store.get_required(t.id).await.unwrap();
        assert_eq!(unchanged.agent_id, Some(a));
    }

    #[tokio::test]
    async fn assign_reactivates_a_resolved_ticket() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010012")).await.unwrap();

        store.claim(t.id, a).await.unwrap();
        store.transition(t.id, TicketStatus::Resolved, Some("done")).await.unwrap();
        assert_eq!(agent_count(&store, a).await, 0);

        let (updated, changed) = store.assign(t.id, a).await.unwrap();
        assert!(!changed);
        assert_eq!(updated.status, "IN_PROGRESS");
        assert_eq!(agent_count(&store, a).await, 1);
    }

    #[tokio::test]
    async fn transition_stamps_resolution_timestamps_once() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010013")).await.unwrap();
        store.claim(t.id, a).await.unwrap();

        let resolved = store
            .transition(t.id, TicketStatus::Resolved, Some("rebooted it"))
            .await
            .unwrap();
        assert_eq!(resolved.resolution.as_deref(), Some("rebooted it"));
        assert!(resolved.actual_resolution_time.is_some());
        assert!(resolved.closed_at.is_some());

        let closed = store.transition(t.id, TicketStatus::Closed, None).await.unwrap();
        assert_eq!(closed.actual_resolution_time, resolved.actual_resolution_time);
        assert_eq!(closed.closed_at, resolved.closed_at);
        assert_eq!(closed.resolution.as_deref(), Some("rebooted it"));
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_without_side_effects() {
        let store = test_store().await;
        let t = store.create(&new_ticket("T0101010101010014")).await.unwrap();

        let err = store.transition(t.id, TicketStatus::Closed, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)), "{err:?}");
        let unchanged = store.get_required(t.id).await.unwrap();
        assert_eq!(unchanged.status, "OPEN");
    }

    #[tokio::test]
    async fn pending_customer_releases_no_slot() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010015")).await.unwrap();
        store.claim(t.id, a).await.unwrap();

        store.transition(t.id, TicketStatus::PendingCustomer, None).await.unwrap();
        assert_eq!(agent_count(&store, a).await, 1);

        store.transition(t.id, TicketStatus::InProgress, None).await.unwrap();
        assert_eq!(agent_count(&store, a).await, 1);

        store.transition(t.id, TicketStatus::Resolved, None).await.unwrap();
        assert_eq!(agent_count(&store, a).await, 0);
    }

    #[tokio::test]
    async fn direct_close_from_in_progress_stamps_and_releases_the_slot() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010019")).await.unwrap();
        store.claim(t.id, a).await.unwrap();

        let closed = store.transition(t.id, TicketStatus::Closed, None).await.unwrap();
        assert_eq!(closed.status, "CLOSED");
        assert!(closed.actual_resolution_time.is_some());
        assert!(closed.closed_at.is_some());
        assert_eq!(agent_count(&store, a).await, 0);
    }

    #[tokio::test]
    async fn pending_customer_can_resolve_without_reactivating() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010020")).await.unwrap();
        store.claim(t.id, a).await.unwrap();
        store.transition(t.id, TicketStatus::PendingCustomer, None).await.unwrap();

        let resolved = store
            .transition(t.id, TicketStatus::Resolved, Some("no further reply needed"))
            .await
            .unwrap();
        assert_eq!(resolved.status, "RESOLVED");
        assert!(resolved.actual_resolution_time.is_some());
        assert_eq!(agent_count(&store, a).await, 0);
    }

    #[tokio::test]
    async fn delete_requires_open_and_unassigned() {
        let store = test_store().await;
        let a = seed_agent(&store, 5).await;
        let t = store.create(&new_ticket("T0101010101010016")).await.unwrap();
        store.claim(t.id, a).await.unwrap();

        let err = store.delete_open_unassigned(t.id, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)), "{err:?}");

        let open = store.create(&new_ticket("T0101010101010017")).await.unwrap();
        store.delete_open_unassigned(open.id, 1).await.unwrap();
        assert!(store.get(open.id).await.unwrap().is_none());
        let c = store.get_customer(1).await.unwrap().unwrap();
        assert_eq!(c.total_tickets, 1);
    }

    #[tokio::test]
    async fn customer_edit_only_while_open_and_unassigned() {
        let store = test_store().await;
        let t = store.create(&new_ticket("T0101010101010018")).await.unwrap();

        let patch = TicketPatch {
            title: Some("Printer smoking".to_string()),
            priority: Some(TicketPriority::High),
            ..Default::default()
        };
        let updated = store.update_if_editable(t.id, &patch).await.unwrap();
        assert_eq!(updated.title, "Printer smoking");
        assert_eq!(updated.priority, "HIGH");
        assert_eq!(updated.description, t.description);

        let a = seed_agent(&store, 5).await;
        store.claim(t.id, a).await.unwrap();
        let err = store.update_if_editable(t.id, &patch).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)), "{err:?}");
    }
}
