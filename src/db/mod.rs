mod memory;
mod models;
mod postgres;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::error::AwardsError;

/// Primary store for submissions and settings.
///
/// The lock methods are compare-and-set primitives: each one inspects and
/// writes the lock columns in a single atomic step and reports whether it
/// applied. Callers never read the lock state and then write it.
#[async_trait]
pub trait AwardsStore: Send + Sync {
    async fn insert_submission(&self, record: &SubmissionRecord) -> Result<i64, AwardsError>;

    async fn list_submissions(&self) -> Result<Vec<Submission>, AwardsError>;

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, AwardsError>;

    /// Writes the lock if it is free, expired at `now`, or already held by `holder`.
    async fn try_acquire_lock(
        &self,
        id: i64,
        holder: &str,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError>;

    /// Moves the expiry forward if `token` is current and unexpired at `now`.
    async fn renew_lock(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError>;

    /// Clears the lock columns if `token` matches the stored token.
    async fn release_lock(&self, id: i64, token: &str) -> Result<bool, AwardsError>;

    /// Applies `update` if `token` is current and unexpired at `now`.
    async fn apply_update(
        &self,
        id: i64,
        token: &str,
        update: &EvaluationUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, AwardsError>;

    async fn put_setting(&self, key: &str, value: Option<&str>) -> Result<(), AwardsError>;
}

/// Connects lazily so the service can start, and fall back to CSV, while the database is down.
pub fn create_pool(database_url: &str) -> Result<PgPool, AwardsError> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(database_url)
        .map_err(AwardsError::from)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_use_fixed_width_utc() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        let text = format_timestamp(at);
        assert_eq!(text, "2026-03-01T09:05:00.000Z");
        assert_eq!(parse_timestamp(&text), Some(at));
    }

    #[test]
    fn garbage_timestamp_does_not_parse() {
        assert_eq!(parse_timestamp("next tuesday"), None);
    }
}
