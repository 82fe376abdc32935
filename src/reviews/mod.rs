// SPDX-License-Identifier: MIT

//! Post-resolution customer reviews.
//!
//! One review per ticket, written by the ticket's customer once the ticket
//! reaches RESOLVED or CLOSED. Review writes and the agent satisfaction
//! rating they feed run in one transaction.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::EngineError;
use crate::storage::is_unique_violation;
use crate::storage::with_timeout;
use crate::tickets::model::{parse_ts, round2, Actor, ActorRole, TicketStatus};

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReviewRow {
    pub id: i64,
    pub ticket_id: i64,
    pub customer_id: i64,
    pub agent_id: Option<i64>,
    pub company_id: i64,
    /// Overall rating, 1..=5.
    pub rating: i64,
    pub response_time_rating: Option<i64>,
    pub resolution_rating: Option<i64>,
    pub communication_rating: Option<i64>,
    pub would_recommend: Option<bool>,
    pub comment: Option<String>,
    pub additional_comments: Option<String>,
    pub is_published: bool,
    pub is_featured: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateReview {
    pub ticket_id: i64,
    pub rating: i64,
    pub response_time_rating: Option<i64>,
    pub resolution_rating: Option<i64>,
    pub communication_rating: Option<i64>,
    pub would_recommend: Option<bool>,
    pub comment: Option<String>,
    pub additional_comments: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateReview {
    pub rating: Option<i64>,
    pub response_time_rating: Option<i64>,
    pub resolution_rating: Option<i64>,
    pub communication_rating: Option<i64>,
    pub would_recommend: Option<bool>,
    pub comment: Option<String>,
    pub additional_comments: Option<String>,
}

fn validate_rating(label: &str, value: i64) -> Result<(), EngineError> {
    if (1..=5).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{label} must be between 1 and 5, got {value}"
        )))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TicketHead {
    customer_id: i64,
    agent_id: Option<i64>,
    company_id: i64,
    status: String,
}

/// Recomputes the agent's satisfaction rating from all their reviews.
/// NULL when the last review was deleted.
async fn refresh_agent_rating(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    agent_id: i64,
    now: &str,
) -> Result<(), sqlx::Error> {
    let (avg,): (Option<f64>,) =
        sqlx::query_as("SELECT AVG(rating) FROM reviews WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_one(&mut **tx)
            .await?;
    sqlx::query("UPDATE agents SET customer_satisfaction_rating = ?, updated_at = ? WHERE id = ?")
        .bind(avg.map(round2))
        .bind(now)
        .bind(agent_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[derive(Clone)]
pub struct ReviewDesk {
    pool: SqlitePool,
    edit_window_hours: i64,
}

impl ReviewDesk {
    pub fn new(pool: SqlitePool, edit_window_hours: i64) -> Self {
        Self {
            pool,
            edit_window_hours,
        }
    }

    pub async fn create(&self, actor: Actor, req: &CreateReview) -> Result<ReviewRow, EngineError> {
        if actor.role != ActorRole::Customer {
            return Err(EngineError::Forbidden(
                "only the ticket's customer may leave a review".to_string(),
            ));
        }
        validate_rating("rating", req.rating)?;
        for (label, value) in [
            ("response_time_rating", req.response_time_rating),
            ("resolution_rating", req.resolution_rating),
            ("communication_rating", req.communication_rating),
        ] {
            if let Some(v) = value {
                validate_rating(label, v)?;
            }
        }

        let mut tx = self.pool.begin().await?;
        let ticket = sqlx::query_as::<_, TicketHead>(
            "SELECT customer_id, agent_id, company_id, status FROM tickets WHERE id = ?",
        )
        .bind(req.ticket_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| EngineError::not_found("ticket", req.ticket_id))?;

        if ticket.customer_id != actor.id {
            tx.rollback().await?;
            return Err(EngineError::Forbidden(
                "only the ticket's customer may leave a review".to_string(),
            ));
        }
        match TicketStatus::parse(&ticket.status) {
            Some(TicketStatus::Resolved) | Some(TicketStatus::Closed) => {}
            _ => {
                tx.rollback().await?;
                return Err(EngineError::InvalidTransition(format!(
                    "only resolved or closed tickets can be reviewed; ticket {} is {}",
                    req.ticket_id, ticket.status
                )));
            }
        }

        let duplicate: Option<(i64,)> = sqlx::query_as("SELECT id FROM reviews WHERE ticket_id = ?")
            .bind(req.ticket_id)
            .fetch_optional(&mut *tx)
            .await?;
        if duplicate.is_some() {
            tx.rollback().await?;
            return Err(EngineError::Conflict(format!(
                "ticket {} already has a review",
                req.ticket_id
            )));
        }

        let now = Utc::now().to_rfc3339();
        let inserted = sqlx::query(
            "INSERT INTO reviews (ticket_id, customer_id, agent_id, company_id, rating,
                                  response_time_rating, resolution_rating, communication_rating,
                                  would_recommend, comment, additional_comments,
                                  is_published, is_featured, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(req.ticket_id)
        .bind(ticket.customer_id)
        .bind(ticket.agent_id)
        .bind(ticket.company_id)
        .bind(req.rating)
        .bind(req.response_time_rating)
        .bind(req.resolution_rating)
        .bind(req.communication_rating)
        .bind(req.would_recommend)
        .bind(req.comment.as_deref().map(str::trim))
        .bind(req.additional_comments.as_deref().map(str::trim))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await;
        let id = match inserted {
            Ok(r) => r.last_insert_rowid(),
            // Lost the insert race to a concurrent review of the same ticket.
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Err(EngineError::Conflict(format!(
                    "ticket {} already has a review",
                    req.ticket_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(agent_id) = ticket.agent_id {
            refresh_agent_rating(&mut tx, agent_id, &now).await?;
        }
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn update(
        &self,
        actor: Actor,
        review_id: i64,
        req: &UpdateReview,
    ) -> Result<ReviewRow, EngineError> {
        for (label, value) in [
            ("rating", req.rating),
            ("response_time_rating", req.response_time_rating),
            ("resolution_rating", req.resolution_rating),
            ("communication_rating", req.communication_rating),
        ] {
            if let Some(v) = value {
                validate_rating(label, v)?;
            }
        }

        let mut tx = self.pool.begin().await?;
        let review = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = ?")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("review", review_id))?;

        if actor.role != ActorRole::Customer || review.customer_id != actor.id {
            tx.rollback().await?;
            return Err(EngineError::Forbidden(
                "only the review's author may edit it".to_string(),
            ));
        }
        let now = Utc::now();
        let editable = parse_ts(&review.created_at)
            .map(|created| now - created <= Duration::hours(self.edit_window_hours))
            .unwrap_or(false);
        if !editable {
            tx.rollback().await?;
            return Err(EngineError::Forbidden(format!(
                "reviews can only be edited within {} hours",
                self.edit_window_hours
            )));
        }

        let now = now.to_rfc3339();
        sqlx::query(
            "UPDATE reviews SET
                 rating = COALESCE(?, rating),
                 response_time_rating = COALESCE(?, response_time_rating),
                 resolution_rating = COALESCE(?, resolution_rating),
                 communication_rating = COALESCE(?, communication_rating),
                 would_recommend = COALESCE(?, would_recommend),
                 comment = COALESCE(?, comment),
                 additional_comments = COALESCE(?, additional_comments),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(req.rating)
        .bind(req.response_time_rating)
        .bind(req.resolution_rating)
        .bind(req.communication_rating)
        .bind(req.would_recommend)
        .bind(req.comment.as_deref().map(str::trim))
        .bind(req.additional_comments.as_deref().map(str::trim))
        .bind(&now)
        .bind(review_id)
        .execute(&mut *tx)
        .await?;

        if let Some(agent_id) = review.agent_id {
            refresh_agent_rating(&mut tx, agent_id, &now).await?;
        }
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = ?")
            .bind(review_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn delete(&self, actor: Actor, review_id: i64) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;
        let review = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = ?")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("review", review_id))?;
        let allowed = match actor.role {
            ActorRole::Admin => true,
            ActorRole::Customer => review.customer_id == actor.id,
            ActorRole::Agent => false,
        };
        if !allowed {
            tx.rollback().await?;
            return Err(EngineError::Forbidden(
                "only the review's author or an administrator may delete it".to_string(),
            ));
        }
        sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;
        if let Some(agent_id) = review.agent_id {
            refresh_agent_rating(&mut tx, agent_id, &Utc::now().to_rfc3339()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ─── Moderation ─────────────────────────────────────────────────────────

    pub async fn set_published(
        &self,
        actor: Actor,
        review_id: i64,
        published: bool,
    ) -> Result<ReviewRow, EngineError> {
        self.moderate(actor, review_id, "is_published", published).await
    }

    pub async fn set_featured(
        &self,
        actor: Actor,
        review_id: i64,
        featured: bool,
    ) -> Result<ReviewRow, EngineError> {
        self.moderate(actor, review_id, "is_featured", featured).await
    }

    async fn moderate(
        &self,
        actor: Actor,
        review_id: i64,
        column: &str,
        value: bool,
    ) -> Result<ReviewRow, EngineError> {
        if actor.role != ActorRole::Admin {
            return Err(EngineError::Forbidden(
                "review moderation is an administrator operation".to_string(),
            ));
        }
        // `column` is one of two literals above, never caller input.
        let result = sqlx::query(&format!(
            "UPDATE reviews SET {column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .bind(review_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("review", review_id));
        }
        self.get_required(review_id).await
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub async fn get(&self, review_id: i64) -> Result<Option<ReviewRow>, EngineError> {
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = ?")
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_required(&self, review_id: i64) -> Result<ReviewRow, EngineError> {
        self.get(review_id)
            .await?
            .ok_or_else(|| EngineError::not_found("review", review_id))
    }

    /// Company reviews, newest first. Non-admin callers only see published
    /// reviews.
    pub async fn list_company(
        &self,
        actor: Actor,
        company_id: i64,
    ) -> Result<Vec<ReviewRow>, EngineError> {
        with_timeout(async {
            let rows = if actor.role == ActorRole::Admin {
                sqlx::query_as::<_, ReviewRow>(
                    "SELECT * FROM reviews WHERE company_id = ? ORDER BY created_at DESC, id DESC",
                )
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query_as::<_, ReviewRow>(
                    "SELECT * FROM reviews WHERE company_id = ? AND is_published = 1
                     ORDER BY created_at DESC, id DESC",
                )
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?
            };
            Ok(rows)
        })
        .await
    }
}
