//! Provider usage logging utilities.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    database::{DbError, DbPool},
    error::AppError,
    models::Worker,
};

/// Records provider invocation metrics for operator visibility.
#[derive(Clone, Debug)]
pub struct UsageLogger {
    pool: Arc<DbPool>,
}

impl UsageLogger {
    /// Creates a new usage logger backed by the SQLite pool.
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Persists a usage record for one adapter attempt.
    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        &self,
        provider: &str,
        model: Option<&str>,
        worker: Worker,
        success: bool,
        latency_ms: i64,
        tokens_used: Option<i64>,
        cost_cents: Option<f64>,
        error_message: Option<String>,
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let success_flag = i64::from(success);

        let result = sqlx::query(
            r#"INSERT INTO provider_usage
               (provider, model, worker, success, latency_ms, tokens_used, cost_cents, error_message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(provider)
        .bind(model)
        .bind(worker.as_str())
        .bind(success_flag)
        .bind(latency_ms)
        .bind(tokens_used)
        .bind(cost_cents)
        .bind(error_message)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|err| AppError::DatabaseError(DbError::QueryFailed(err)))?;

        let _ = result.rows_affected();

        Ok(())
    }
}
