// SPDX-License-Identifier: MIT
//! Pure aggregation over already-fetched rows. Nothing in here touches the
//! database or mutates state.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::insights::model::{
    AgentSnapshot, CompanyInsights, CompanySummary, CustomerInsights, LabelCount, MonthlyTrend,
    ReviewInsights, TicketInsights,
};
use crate::reviews::ReviewRow;
use crate::storage::{AgentRow, CustomerRow};
use crate::tickets::model::{parse_ts, round2, TicketStatus};

/// The slice of a ticket row the aggregator needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TicketFacts {
    pub status: String,
    pub priority: String,
    pub category_id: Option<i64>,
    pub customer_id: i64,
    pub agent_id: Option<i64>,
    pub created_at: String,
    pub closed_at: Option<String>,
}

/// Everything `company_insights` consumes, fetched in one pass by the store.
pub struct InsightSource {
    pub tickets: Vec<TicketFacts>,
    pub agents: Vec<AgentRow>,
    pub customers: Vec<CustomerRow>,
    pub reviews: Vec<ReviewRow>,
    pub categories: HashMap<i64, String>,
}

impl TicketFacts {
    fn status(&self) -> Option<TicketStatus> {
        TicketStatus::parse(&self.status)
    }
}

fn is_active(status: Option<TicketStatus>) -> bool {
    matches!(
        status,
        Some(TicketStatus::Open) | Some(TicketStatus::InProgress) | Some(TicketStatus::PendingCustomer)
    )
}

fn is_resolved(status: Option<TicketStatus>) -> bool {
    matches!(status, Some(TicketStatus::Resolved) | Some(TicketStatus::Closed))
}

/// Histogram sorted by count descending, ties broken by label.
fn histogram<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<LabelCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    let mut out: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
    out
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0u32;
    for v in values {
        sum += v;
        n += 1;
    }
    (n > 0).then(|| round2(sum / n as f64))
}

fn summary(src: &InsightSource, now: DateTime<Utc>) -> CompanySummary {
    let mut active = 0;
    let mut closed = 0;
    let mut escalated = 0;
    let mut recent = 0;
    let mut customers_served = HashSet::new();
    let cutoff = now - Duration::days(30);
    for t in &src.tickets {
        let status = t.status();
        if is_active(status) {
            active += 1;
        } else {
            closed += 1;
        }
        if status == Some(TicketStatus::PendingCustomer) {
            escalated += 1;
        }
        if parse_ts(&t.created_at).is_some_and(|c| c >= cutoff) {
            recent += 1;
        }
        customers_served.insert(t.customer_id);
    }
    let resolution_hours = mean(src.tickets.iter().filter_map(|t| {
        let created = parse_ts(&t.created_at)?;
        let closed = t.closed_at.as_deref().and_then(parse_ts)?;
        Some((closed - created).num_seconds().max(0) as f64 / 3600.0)
    }));
    CompanySummary {
        total_tickets: src.tickets.len() as i64,
        active_tickets: active,
        closed_tickets: closed,
        escalated_tickets: escalated,
        average_resolution_hours: resolution_hours,
        tickets_last_30_days: recent,
        average_review_rating: mean(src.reviews.iter().map(|r| r.rating as f64)),
        total_agents: src.agents.len() as i64,
        available_agents: src.agents.iter().filter(|a| a.is_available).count() as i64,
        distinct_customers: customers_served.len() as i64,
    }
}

/// One grouping pass over tickets keyed by agent id, joined with the stored
/// satisfaction rating, busiest resolvers first.
fn agent_snapshots(src: &InsightSource) -> Vec<AgentSnapshot> {
    let mut by_agent: HashMap<i64, (i64, i64, i64)> = HashMap::new();
    for t in &src.tickets {
        let Some(agent_id) = t.agent_id else { continue };
        let entry = by_agent.entry(agent_id).or_insert((0, 0, 0));
        entry.0 += 1;
        let status = t.status();
        if status.is_some_and(|s| s.occupies_agent()) {
            entry.1 += 1;
        }
        if is_resolved(status) {
            entry.2 += 1;
        }
    }
    let mut out: Vec<AgentSnapshot> = src
        .agents
        .iter()
        .map(|a| {
            let (assigned, active, resolved) = by_agent.get(&a.id).copied().unwrap_or((0, 0, 0));
            AgentSnapshot {
                agent_id: a.id,
                name: a.name.clone(),
                assigned,
                active,
                resolved,
                satisfaction_rating: a.customer_satisfaction_rating,
            }
        })
        .collect();
    out.sort_by(|a, b| b.resolved.cmp(&a.resolved).then(a.name.cmp(&b.name)));
    out
}

fn ticket_insights(src: &InsightSource) -> TicketInsights {
    let mut categories: HashMap<i64, i64> = HashMap::new();
    let mut months: BTreeMap<String, (i64, i64, i64)> = BTreeMap::new();
    for t in &src.tickets {
        if let Some(cat) = t.category_id {
            *categories.entry(cat).or_insert(0) += 1;
        }
        if let Some(created) = parse_ts(&t.created_at) {
            let key = format!("{:04}-{:02}", created.year(), created.month());
            let bucket = months.entry(key).or_insert((0, 0, 0));
            bucket.0 += 1;
            let status = t.status();
            if is_resolved(status) {
                bucket.1 += 1;
            }
            if status == Some(TicketStatus::PendingCustomer) {
                bucket.2 += 1;
            }
        }
    }
    let mut top_categories: Vec<LabelCount> = categories
        .into_iter()
        .map(|(id, count)| LabelCount {
            label: src
                .categories
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("category {id}")),
            count,
        })
        .collect();
    top_categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
    top_categories.truncate(5);

    TicketInsights {
        by_status: histogram(src.tickets.iter().map(|t| t.status.as_str())),
        by_priority: histogram(src.tickets.iter().map(|t| t.priority.as_str())),
        top_categories,
        monthly_trends: months
            .into_iter()
            .map(|(month, (total, resolved, escalated))| MonthlyTrend {
                month,
                total,
                resolved,
                escalated,
            })
            .collect(),
    }
}

fn customer_insights(src: &InsightSource, now: DateTime<Utc>) -> CustomerInsights {
    let with_tickets: HashSet<i64> = src.tickets.iter().map(|t| t.customer_id).collect();
    let this_month = (now.year(), now.month());
    CustomerInsights {
        active_customers: src
            .customers
            .iter()
            .filter(|c| with_tickets.contains(&c.id))
            .count() as i64,
        new_this_month: src
            .customers
            .iter()
            .filter(|c| {
                parse_ts(&c.created_at).is_some_and(|t| (t.year(), t.month()) == this_month)
            })
            .count() as i64,
        average_satisfaction: mean(src.customers.iter().filter_map(|c| c.satisfaction_score)),
        by_contact_method: histogram(
            src.customers.iter().map(|c| c.preferred_contact_method.as_str()),
        ),
        by_type: histogram(src.customers.iter().map(|c| c.customer_type.as_str())),
    }
}

fn review_insights(src: &InsightSource) -> ReviewInsights {
    let total = src.reviews.len() as i64;
    let mut buckets = [0i64; 5];
    let mut recommended = 0i64;
    for r in &src.reviews {
        if (1..=5).contains(&r.rating) {
            buckets[(r.rating - 1) as usize] += 1;
        }
        if r.would_recommend == Some(true) {
            recommended += 1;
        }
    }
    let recommendation_rate = if total > 0 {
        round2(100.0 * recommended as f64 / total as f64)
    } else {
        0.0
    };
    let mut recent = src.reviews.clone();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    recent.truncate(6);

    ReviewInsights {
        total_reviews: total,
        average_rating: mean(src.reviews.iter().map(|r| r.rating as f64)),
        recommendation_rate,
        rating_histogram: buckets
            .iter()
            .enumerate()
            .map(|(i, count)| LabelCount {
                label: (i + 1).to_string(),
                count: *count,
            })
            .collect(),
        recent,
    }
}

pub fn company_insights(company_id: i64, now: DateTime<Utc>, src: &InsightSource) -> CompanyInsights {
    CompanyInsights {
        company_id,
        generated_at: now.to_rfc3339(),
        summary: summary(src, now),
        agents: agent_snapshots(src),
        tickets: ticket_insights(src),
        customers: customer_insights(src, now),
        reviews: review_insights(src),
    }
}
