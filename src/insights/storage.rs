// SPDX-License-Identifier: MIT
//! Insight source queries — fetches the company's rows once, then hands
//! them to [`aggregate`](super::aggregate) for the pure rollup.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::EngineError;
use crate::insights::aggregate::{self, InsightSource, TicketFacts};
use crate::insights::model::CompanyInsights;
use crate::reviews::ReviewRow;
use crate::storage::{with_timeout, AgentRow, CustomerRow};

#[derive(Clone)]
pub struct InsightStore {
    pool: SqlitePool,
}

impl InsightStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn company_insights(&self, company_id: i64) -> Result<CompanyInsights, EngineError> {
        with_timeout(async {
            let src = self.fetch(company_id).await?;
            Ok(aggregate::company_insights(company_id, Utc::now(), &src))
        })
        .await
    }

    async fn fetch(&self, company_id: i64) -> Result<InsightSource, EngineError> {
        let company: Option<(i64,)> = sqlx::query_as("SELECT id FROM companies WHERE id = ?")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        if company.is_none() {
            return Err(EngineError::not_found("company", company_id));
        }

        let tickets = sqlx::query_as::<_, TicketFacts>(
            "SELECT status, priority, category_id, customer_id, agent_id, created_at, closed_at
             FROM tickets WHERE company_id = ?",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        let agents = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE company_id = ?")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        let customers =
            sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE company_id = ?")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?;
        let reviews = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE company_id = ?")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        let categories: HashMap<i64, String> =
            sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM categories WHERE company_id = ?")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        Ok(InsightSource {
            tickets,
            agents,
            customers,
            reviews,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_company_is_not_found() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
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
        let store = InsightStore::new(pool);
        let err = store.company_insights(404).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)), "{err:?}");
    }
}
