//! Advisory per-submission edit lock.
//!
//! The lock lives in three columns of the submission row (token, expiry,
//! holder). Acquire, renew and release are single conditional writes in the
//! store; expiry is enforced by comparison only, so an abandoned lock simply
//! stops counting once its expiry passes and is overwritten by the next
//! acquirer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, AwardsStore, EvaluationUpdate, LockStatus};
use crate::error::AwardsError;

pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 120;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockGrant {
    pub record_id: i64,
    pub token: String,
    pub holder: String,
    pub expires_at: String,
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn AwardsStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn AwardsStore>, clock: Arc<dyn Clock>, timeout_secs: i64) -> Self {
        Self {
            store,
            clock,
            timeout: Duration::seconds(timeout_secs),
        }
    }

    pub async fn acquire(&self, record_id: i64, holder: &str) -> Result<LockGrant, AwardsError> {
        let holder = holder.trim();
        if holder.is_empty() {
            return Err(AwardsError::Validation("lock holder is required".into()));
        }

        // A refusal can race with a release or expiry; one retry covers that window.
        for attempt in 0..2 {
            let now = self.clock.now();
            let expires_at = now + self.timeout;
            let token = Uuid::new_v4().to_string();

            if self
                .store
                .try_acquire_lock(record_id, holder, &token, expires_at, now)
                .await?
            {
                info!("Lock on submission {} granted to {}", record_id, holder);
                return Ok(LockGrant {
                    record_id,
                    token,
                    holder: holder.to_string(),
                    expires_at: format_timestamp(expires_at),
                });
            }

            // The conditional write already decided; this read only explains the refusal.
            let submission = self
                .store
                .get_submission(record_id)
                .await?
                .ok_or(AwardsError::NotFound)?;
            let current = lock_status(
                submission.record.lock_holder.as_deref(),
                submission.record.lock_expiry.as_deref(),
                self.clock.now(),
            );
            if let LockStatus::Held { holder: current_holder, expires_at } = current {
                warn!(
                    "Lock on submission {} refused to {}: held by {} until {}",
                    record_id, holder, current_holder, expires_at
                );
                return Err(AwardsError::LockHeld {
                    holder: current_holder,
                    expires_at,
                });
            }
            debug!(
                "Lock on submission {} freed after refusal (attempt {})",
                record_id,
                attempt + 1
            );
        }

        Err(AwardsError::LockContended)
    }

    pub async fn renew(&self, record_id: i64, token: &str) -> Result<LockGrant, AwardsError> {
        let now = self.clock.now();
        let expires_at = now + self.timeout;
        if !self
            .store
            .renew_lock(record_id, token, expires_at, now)
            .await?
        {
            return Err(self.lost_or_missing(record_id).await);
        }
        let holder = self
            .store
            .get_submission(record_id)
            .await?
            .and_then(|s| s.record.lock_holder)
            .unwrap_or_default();
        debug!("Lock on submission {} renewed until {}", record_id, expires_at);
        Ok(LockGrant {
            record_id,
            token: token.to_string(),
            holder,
            expires_at: format_timestamp(expires_at),
        })
    }

    /// Releasing a lock that is already gone, or that someone else now holds, is a no-op.
    pub async fn release(&self, record_id: i64, token: &str) -> Result<(), AwardsError> {
        if self.store.release_lock(record_id, token).await? {
            info!("Lock on submission {} released", record_id);
        } else {
            debug!("Release on submission {} ignored: token not current", record_id);
        }
        Ok(())
    }

    pub async fn status(&self, record_id: i64) -> Result<LockStatus, AwardsError> {
        let submission = self
            .store
            .get_submission(record_id)
            .await?
            .ok_or(AwardsError::NotFound)?;
        Ok(lock_status(
            submission.record.lock_holder.as_deref(),
            submission.record.lock_expiry.as_deref(),
            self.clock.now(),
        ))
    }

    /// Writes evaluation state while holding the lock.
    pub async fn update(
        &self,
        record_id: i64,
        token: &str,
        update: &EvaluationUpdate,
    ) -> Result<(), AwardsError> {
        let now = self.clock.now();
        if self
            .store
            .apply_update(record_id, token, update, now)
            .await?
        {
            return Ok(());
        }
        Err(self.lost_or_missing(record_id).await)
    }

    async fn lost_or_missing(&self, record_id: i64) -> AwardsError {
        match self.store.get_submission(record_id).await {
            Ok(Some(_)) => AwardsError::LockLost,
            Ok(None) => AwardsError::NotFound,
            Err(e) => e,
        }
    }
}

/// Interprets stored lock columns at `now`. A lock whose expiry has passed counts as released.
pub fn lock_status(holder: Option<&str>, expiry: Option<&str>, now: DateTime<Utc>) -> LockStatus {
    match (holder, expiry) {
        (Some(holder), Some(expiry)) => match parse_timestamp(expiry) {
            Some(at) if now < at => LockStatus::Held {
                holder: holder.to_string(),
                expires_at: expiry.to_string(),
            },
            _ => LockStatus::Unlocked,
        },
        _ => LockStatus::Unlocked,
    }
}
