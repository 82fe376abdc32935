// SPDX-License-Identifier: MIT
//! Ticket data model types.

use serde::{Deserialize, Serialize};

/// Lifecycle states of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    PendingCustomer,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::PendingCustomer => "PENDING_CUSTOMER",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "IN_PROGRESS" => Some(Self::InProgress),
            "PENDING_CUSTOMER" => Some(Self::PendingCustomer),
            "RESOLVED" => Some(Self::Resolved),
            "CLOSED" => Some(Self::Closed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a ticket in this state occupies a slot of its assigned
    /// agent's concurrent workload.
    pub fn occupies_agent(&self) -> bool {
        matches!(self, Self::InProgress | Self::PendingCustomer)
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "URGENT" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Channel a ticket arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketSource {
    Web,
    Email,
    Phone,
    Chat,
    Api,
}

impl TicketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Chat => "CHAT",
            Self::Api => "API",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WEB" => Some(Self::Web),
            "EMAIL" => Some(Self::Email),
            "PHONE" => Some(Self::Phone),
            "CHAT" => Some(Self::Chat),
            "API" => Some(Self::Api),
            _ => None,
        }
    }
}

/// Kind of a ticket response. Derived from the author's role rather than
/// accepted from the caller (admins may override to post internal notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    AgentReply,
    CustomerReply,
    InternalNote,
    SystemUpdate,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentReply => "AGENT_REPLY",
            Self::CustomerReply => "CUSTOMER_REPLY",
            Self::InternalNote => "INTERNAL_NOTE",
            Self::SystemUpdate => "SYSTEM_UPDATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AGENT_REPLY" => Some(Self::AgentReply),
            "CUSTOMER_REPLY" => Some(Self::CustomerReply),
            "INTERNAL_NOTE" => Some(Self::InternalNote),
            "SYSTEM_UPDATE" => Some(Self::SystemUpdate),
            _ => None,
        }
    }
}

/// Who is performing an engine operation.
///
/// Resolution of credentials to an actor happens at the transport boundary;
/// the engine only sees the resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: ActorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Customer,
    Agent,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Agent => "AGENT",
            Self::Admin => "ADMIN",
        }
    }
}

impl Actor {
    pub fn customer(id: i64) -> Self {
        Self {
            id,
            role: ActorRole::Customer,
        }
    }

    pub fn agent(id: i64) -> Self {
        Self {
            id,
            role: ActorRole::Agent,
        }
    }

    pub fn admin(id: i64) -> Self {
        Self {
            id,
            role: ActorRole::Admin,
        }
    }
}

/// Round half-up to 2 decimal places. All derived metrics (response hours,
/// resolution averages, ratings) use this rounding.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0 + 0.5).floor() / 100.0
}

/// Parses a stored RFC 3339 timestamp. Returns `None` for rows written by
/// external tools in some other format.
pub(crate) fn parse_ts(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&chrono::Utc))
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct TicketRow {
    pub id: i64,
    pub ticket_number: String,
    pub company_id: i64,
    pub customer_id: i64,
    pub agent_id: Option<i64>,
    pub category_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub source: String,
    pub resolution: Option<String>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
    pub estimated_resolution_time: Option<String>,
    pub actual_resolution_time: Option<String>,
    pub first_response_time: Option<String>,
    pub last_activity: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
}

impl TicketRow {
    /// Parsed lifecycle status. All writers go through
    /// [`TicketStatus::as_str`], so rows this crate wrote always parse.
    pub fn status(&self) -> TicketStatus {
        TicketStatus::parse(&self.status).unwrap_or(TicketStatus::Open)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ResponseRow {
    pub id: i64,
    pub ticket_id: i64,
    pub author_id: i64,
    pub author_role: String,
    pub response_type: String,
    pub message: String,
    pub attachments: Option<String>,
    pub is_public: bool,
    /// Hours between ticket creation and this response, rounded to 2 decimals.
    pub response_time_hours: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}
