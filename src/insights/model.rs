// SPDX-License-Identifier: MIT
//! Insight data models — serialisable types returned by the insights RPC.

use serde::Serialize;

use crate::reviews::ReviewRow;

/// A (label, count) pair used in histograms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// One calendar month of ticket traffic, keyed by `created_at` year-month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyTrend {
    /// Bucket key, e.g. `"2026-03"`.
    pub month: String,
    pub total: i64,
    /// Tickets from this bucket currently RESOLVED or CLOSED.
    pub resolved: i64,
    /// Tickets from this bucket currently waiting on the customer.
    pub escalated: i64,
}

/// Headline numbers for one company.
#[derive(Debug, Clone, Serialize)]
pub struct CompanySummary {
    pub total_tickets: i64,
    /// OPEN, IN_PROGRESS or PENDING_CUSTOMER.
    pub active_tickets: i64,
    /// RESOLVED, CLOSED or CANCELLED.
    pub closed_tickets: i64,
    /// PENDING_CUSTOMER only.
    pub escalated_tickets: i64,
    /// Mean of `closed_at - created_at` over tickets with both stamps.
    pub average_resolution_hours: Option<f64>,
    pub tickets_last_30_days: i64,
    pub average_review_rating: Option<f64>,
    pub total_agents: i64,
    pub available_agents: i64,
    pub distinct_customers: i64,
}

/// Per-agent rollup, sorted by resolved-ticket count descending.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: i64,
    pub name: String,
    pub assigned: i64,
    pub active: i64,
    pub resolved: i64,
    pub satisfaction_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketInsights {
    pub by_status: Vec<LabelCount>,
    pub by_priority: Vec<LabelCount>,
    /// Top 5 categories by ticket count; uncategorised tickets are skipped.
    pub top_categories: Vec<LabelCount>,
    /// Ascending by month.
    pub monthly_trends: Vec<MonthlyTrend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerInsights {
    /// Customers with at least one ticket.
    pub active_customers: i64,
    pub new_this_month: i64,
    pub average_satisfaction: Option<f64>,
    pub by_contact_method: Vec<LabelCount>,
    pub by_type: Vec<LabelCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewInsights {
    pub total_reviews: i64,
    pub average_rating: Option<f64>,
    /// Percentage of reviews with `would_recommend == true`, over all reviews.
    pub recommendation_rate: f64,
    /// Buckets "1" through "5", zero-filled.
    pub rating_histogram: Vec<LabelCount>,
    /// The 6 most recent reviews.
    pub recent: Vec<ReviewRow>,
}

/// Full insight payload returned by `insights.company`.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyInsights {
    pub company_id: i64,
    pub generated_at: String,
    pub summary: CompanySummary,
    pub agents: Vec<AgentSnapshot>,
    pub tickets: TicketInsights,
    pub customers: CustomerInsights,
    pub reviews: ReviewInsights,
}
