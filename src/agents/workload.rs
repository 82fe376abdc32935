// SPDX-License-Identifier: MIT
//! Agent workload bookkeeping.
//!
//! `current_ticket_count` mirrors the number of tickets assigned to the agent
//! whose status is IN_PROGRESS or PENDING_CUSTOMER. Assignment, claim and
//! status changes all adjust the counter through this module so the invariant
//! has a single enforcement point. Callers run these inside their own
//! transaction; the ticket mutation and the counter adjustment commit or roll
//! back together.

use sqlx::SqliteConnection;

/// Atomically take one workload slot on the agent, honoring the capacity
/// ceiling (`max_concurrent_tickets <= 0` means unlimited). Returns `false`
/// when the agent is already at capacity; the check and the increment are a
/// single conditional update, so concurrent reservations cannot overshoot.
pub(crate) async fn reserve_slot(
    conn: &mut SqliteConnection,
    agent_id: i64,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE agents
         SET current_ticket_count = current_ticket_count + 1, updated_at = ?
         WHERE id = ?
           AND (max_concurrent_tickets <= 0 OR current_ticket_count < max_concurrent_tickets)",
    )
    .bind(now)
    .bind(agent_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(updated > 0)
}

/// Release one workload slot. Clamped at zero.
pub(crate) async fn release_slot(
    conn: &mut SqliteConnection,
    agent_id: i64,
    now: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE agents
         SET current_ticket_count = MAX(0, current_ticket_count - 1), updated_at = ?
         WHERE id = ?",
    )
    .bind(now)
    .bind(agent_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// React to a status change of a ticket that keeps its agent: no-op when the
/// active classification did not change, otherwise adjust by exactly one.
pub(crate) async fn on_status_change(
    conn: &mut SqliteConnection,
    agent_id: i64,
    was_active: bool,
    is_active: bool,
    now: &str,
) -> Result<(), sqlx::Error> {
    if was_active == is_active {
        return Ok(());
    }
    if is_active {
        sqlx::query(
            "UPDATE agents SET current_ticket_count = current_ticket_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(agent_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    } else {
        release_slot(conn, agent_id, now).await
    }
}
