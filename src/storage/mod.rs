use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

use crate::error::EngineError;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
pub(crate) const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
pub(crate) async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(QUERY_TIMEOUT)),
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation)
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompanyRow {
    pub id: i64,
    pub name: String,
    pub domain: Option<String>,
    pub subscription_plan: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CustomerRow {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub customer_type: String,
    pub preferred_contact_method: String,
    pub satisfaction_score: Option<f64>,
    /// Lifetime ticket count, maintained in the same transaction as
    /// ticket creation and deletion.
    pub total_tickets: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AgentRow {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub specialization: Option<String>,
    /// 0 means unlimited.
    pub max_concurrent_tickets: i64,
    /// Tickets currently occupying this agent (IN_PROGRESS or PENDING_CUSTOMER).
    pub current_ticket_count: i64,
    pub total_tickets_handled: i64,
    pub average_resolution_time: Option<f64>,
    pub customer_satisfaction_rating: Option<f64>,
    pub is_available: bool,
    pub shift_start: Option<String>,
    pub shift_end: Option<String>,
    /// JSON array of upper-case day names, e.g. `["MONDAY","TUESDAY"]`.
    pub working_days: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CategoryRow {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("deskd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    /// Used to create the domain stores that share the same SQLite database.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Reference entities ─────────────────────────────────────────────────
    //
    // Companies, customers and categories are provisioned out of band (there
    // is no RPC surface for them). These helpers exist for bootstrap tooling
    // and tests.

    pub async fn create_company(&self, name: &str, domain: Option<&str>) -> Result<CompanyRow> {
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query(
            "INSERT INTO companies (name, domain, subscription_plan, created_at)
             VALUES (?, ?, 'BASIC', ?)",
        )
        .bind(name)
        .bind(domain)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(sqlx::query_as("SELECT * FROM companies WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn create_customer(
        &self,
        company_id: i64,
        name: &str,
        email: &str,
    ) -> Result<CustomerRow> {
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query(
            "INSERT INTO customers (company_id, name, email, customer_type, preferred_contact_method, total_tickets, created_at)
             VALUES (?, ?, ?, 'INDIVIDUAL', 'EMAIL', 0, ?)",
        )
        .bind(company_id)
        .bind(name)
        .bind(email)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(sqlx::query_as("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn create_category(
        &self,
        company_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<CategoryRow> {
        let id = sqlx::query("INSERT INTO categories (company_id, name, description) VALUES (?, ?, ?)")
            .bind(company_id)
            .bind(name)
            .bind(description)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(sqlx::query_as("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn get_company(&self, id: i64) -> Result<Option<CompanyRow>> {
        Ok(sqlx::query_as("SELECT * FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_customer(&self, id: i64) -> Result<Option<CustomerRow>> {
        Ok(sqlx::query_as("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
