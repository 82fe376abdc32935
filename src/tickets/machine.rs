// SPDX-License-Identifier: MIT
//! Ticket lifecycle state machine.
//!
//! Every status change funnels through [`ensure`] so the transition rules are
//! declared, and tested, in exactly one place.

use crate::error::EngineError;
use crate::tickets::model::TicketStatus;

/// Returns `true` if a ticket may move from `from` to `to`.
///
/// Lifecycle: OPEN → IN_PROGRESS → {PENDING_CUSTOMER, RESOLVED, CLOSED},
/// with CANCELLED reachable from OPEN and IN_PROGRESS. PENDING_CUSTOMER
/// returns to IN_PROGRESS on further agent activity, or moves straight to
/// RESOLVED/CLOSED when the agent wraps the ticket up without reactivating
/// it. OPEN is the only initial state; CLOSED and CANCELLED are terminal.
pub fn valid_transition(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::*;
    matches!(
        (from, to),
        (Open, InProgress)
            | (Open, Cancelled)
            | (InProgress, PendingCustomer)
            | (InProgress, Resolved)
            | (InProgress, Closed)
            | (InProgress, Cancelled)
            | (PendingCustomer, InProgress)
            | (PendingCustomer, Resolved)
            | (PendingCustomer, Closed)
            | (Resolved, Closed)
    )
}

/// Validate a transition, producing the human-readable rejection the RPC
/// surface reports.
pub fn ensure(from: TicketStatus, to: TicketStatus) -> Result<(), EngineError> {
    if valid_transition(from, to) {
        return Ok(());
    }
    let reason = match from {
        TicketStatus::Closed => "ticket already closed".to_string(),
        TicketStatus::Cancelled => "ticket already cancelled".to_string(),
        _ => format!(
            "cannot move ticket from {} to {}",
            from.as_str(),
            to.as_str()
        ),
    };
    Err(EngineError::InvalidTransition(reason))
}
