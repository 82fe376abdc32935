//! Engine error taxonomy.
//!
//! Every fallible engine operation returns [`EngineError`]. Services propagate
//! with `?`; the IPC layer maps variants onto JSON-RPC error codes.

use std::time::Duration;

/// Errors returned by the ticket engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The referenced entity does not exist. Payload names it ("ticket 42").
    #[error("{0} not found")]
    NotFound(String),

    /// The actor is not allowed to perform this operation on this entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The operation is not valid in the ticket's current lifecycle state.
    #[error("{0}")]
    InvalidTransition(String),

    /// The ticket is already held by an agent.
    #[error("ticket {ticket_id} is already claimed by agent {agent_id}")]
    AlreadyClaimed { ticket_id: i64, agent_id: i64 },

    /// The target agent has no remaining concurrent-ticket capacity.
    #[error("agent {agent_id} is at capacity ({current}/{max})")]
    CapacityExceeded {
        agent_id: i64,
        current: i64,
        max: i64,
    },

    /// Input rejected before any state was touched.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation or retry exhaustion.
    #[error("{0}")]
    Conflict(String),

    /// A query exceeded the storage timeout.
    #[error("database query timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Underlying database failure.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Shorthand for the common "entity id not found" case.
    pub fn not_found(entity: &str, id: i64) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}
