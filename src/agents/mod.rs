// SPDX-License-Identifier: MIT
//! Agent registry and workload accounting.
//!
//! Registration and availability live here; the capacity counter
//! primitives are in [`workload`] and the read-only views in [`board`].

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::EngineError;
use crate::storage::{with_timeout, AgentRow};

pub mod board;
pub(crate) mod workload;

static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").unwrap());
static SHIFT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());

const DAYS: [&str; 7] = [
    "MONDAY",
    "TUESDAY",
    "WEDNESDAY",
    "THURSDAY",
    "FRIDAY",
    "SATURDAY",
    "SUNDAY",
];

/// Input for [`AgentRegistry::register_agent`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterAgent {
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub specialization: Option<String>,
    /// Concurrent ticket ceiling; omitted or non-positive falls back to the
    /// configured default.
    pub max_concurrent_tickets: Option<i64>,
    pub shift_start: Option<String>,
    pub shift_end: Option<String>,
    pub working_days: Option<Vec<String>>,
}

/// Normalizes free-form day names ("mon", "Tuesday") to the canonical
/// uppercase list, deduplicated in week order, as a JSON array string.
fn normalize_working_days(raw: &[String]) -> Result<String, EngineError> {
    let mut seen = [false; 7];
    for item in raw {
        for token in DAY_RE.find_iter(item) {
            let upper = token.as_str().to_ascii_uppercase();
            let matched = DAYS
                .iter()
                .position(|d| **d == upper || (upper.len() >= 3 && d.starts_with(&upper)));
            match matched {
                Some(idx) => seen[idx] = true,
                None => {
                    return Err(EngineError::Validation(format!(
                        "unknown working day: {}",
                        token.as_str()
                    )))
                }
            }
        }
    }
    let days: Vec<&str> = DAYS
        .iter()
        .zip(seen.iter())
        .filter_map(|(d, s)| s.then_some(*d))
        .collect();
    if days.is_empty() {
        return Err(EngineError::Validation(
            "working_days must name at least one day".to_string(),
        ));
    }
    serde_json::to_string(&days)
        .map_err(|e| EngineError::Validation(format!("working_days: {e}")))
}

fn validate_shift(label: &str, value: &str) -> Result<(), EngineError> {
    if SHIFT_RE.is_match(value) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{label} must be HH:MM, got {value:?}"
        )))
    }
}

#[derive(Clone)]
pub struct AgentRegistry {
    pool: SqlitePool,
    default_max_concurrent: i64,
}

impl AgentRegistry {
    pub fn new(pool: SqlitePool, default_max_concurrent: i64) -> Self {
        Self {
            pool,
            default_max_concurrent,
        }
    }

    pub async fn register_agent(&self, req: &RegisterAgent) -> Result<AgentRow, EngineError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("name is required".to_string()));
        }
        let email = req.email.trim();
        if email.is_empty() {
            return Err(EngineError::Validation("email is required".to_string()));
        }
        if let Some(s) = &req.shift_start {
            validate_shift("shift_start", s)?;
        }
        if let Some(s) = &req.shift_end {
            validate_shift("shift_end", s)?;
        }
        let working_days = match &req.working_days {
            Some(raw) => Some(normalize_working_days(raw)?),
            None => None,
        };

        let company: Option<(i64,)> = sqlx::query_as("SELECT id FROM companies WHERE id = ?")
            .bind(req.company_id)
            .fetch_optional(&self.pool)
            .await?;
        if company.is_none() {
            return Err(EngineError::not_found("company", req.company_id));
        }

        let max = req
            .max_concurrent_tickets
            .filter(|m| *m > 0)
            .unwrap_or(self.default_max_concurrent);
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO agents (company_id, name, email, department, specialization,
                                 max_concurrent_tickets, current_ticket_count,
                                 total_tickets_handled, is_available,
                                 shift_start, shift_end, working_days,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, 1, ?, ?, ?, ?, ?)",
        )
        .bind(req.company_id)
        .bind(name)
        .bind(email)
        .bind(&req.department)
        .bind(&req.specialization)
        .bind(max)
        .bind(&req.shift_start)
        .bind(&req.shift_end)
        .bind(&working_days)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        info!(agent_id = id, company_id = req.company_id, "agent registered");
        self.get_required(id).await
    }

    pub async fn set_availability(
        &self,
        agent_id: i64,
        available: bool,
    ) -> Result<AgentRow, EngineError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE agents SET is_available = ?, updated_at = ? WHERE id = ?")
            .bind(available)
            .bind(&now)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("agent", agent_id));
        }
        self.get_required(agent_id).await
    }

    pub async fn get(&self, agent_id: i64) -> Result<Option<AgentRow>, EngineError> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_required(&self, agent_id: i64) -> Result<AgentRow, EngineError> {
        self.get(agent_id)
            .await?
            .ok_or_else(|| EngineError::not_found("agent", agent_id))
    }

    pub async fn list_by_company(&self, company_id: i64) -> Result<Vec<AgentRow>, EngineError> {
        with_timeout(async {
            let rows = sqlx::query_as::<_, AgentRow>(
                "SELECT * FROM agents WHERE company_id = ? ORDER BY name ASC",
            )
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    /// Rebuilds `current_ticket_count` from the tickets table. The counter is
    /// normally maintained transactionally; this reconciles it after a crash
    /// or manual surgery. Returns how many agents were corrected.
    pub async fn repair_workload_counts(&self) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "UPDATE agents
             SET current_ticket_count = (
                 SELECT COUNT(*) FROM tickets
                 WHERE tickets.agent_id = agents.id
                   AND tickets.status IN ('IN_PROGRESS', 'PENDING_CUSTOMER')
             )
             WHERE current_ticket_count <> (
                 SELECT COUNT(*) FROM tickets
                 WHERE tickets.agent_id = agents.id
                   AND tickets.status IN ('IN_PROGRESS', 'PENDING_CUSTOMER')
             )",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
