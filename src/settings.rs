use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::db::{format_timestamp, parse_timestamp, AwardsStore};
use crate::error::AwardsError;
use crate::lock::Clock;

pub const DEADLINE_KEY: &str = "submission_deadline";
pub const ACTIVE_KEY: &str = "submissions_active";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwardSettings {
    pub deadline: Option<DateTime<Utc>>,
    pub active: bool,
}

impl AwardSettings {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.active && self.deadline.map_or(true, |deadline| now < deadline)
    }
}

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn AwardsStore>,
    clock: Arc<dyn Clock>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn AwardsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self) -> Result<AwardSettings, AwardsError> {
        let deadline = self
            .store
            .get_setting(DEADLINE_KEY)
            .await?
            .as_deref()
            .and_then(parse_timestamp);
        // An absent or unreadable flag leaves submissions open.
        let active = self
            .store
            .get_setting(ACTIVE_KEY)
            .await?
            .map_or(true, |v| !v.trim().eq_ignore_ascii_case("false"));
        Ok(AwardSettings { deadline, active })
    }

    pub async fn set_deadline(&self, deadline: Option<DateTime<Utc>>) -> Result<(), AwardsError> {
        let value = deadline.map(format_timestamp);
        self.store.put_setting(DEADLINE_KEY, value.as_deref()).await?;
        info!("Submission deadline set to {}", value.as_deref().unwrap_or("none"));
        Ok(())
    }

    pub async fn set_active(&self, active: bool) -> Result<(), AwardsError> {
        let value = if active { "true" } else { "false" };
        self.store.put_setting(ACTIVE_KEY, Some(value)).await?;
        info!("Submissions active set to {}", value);
        Ok(())
    }

    pub async fn ensure_open(&self) -> Result<AwardSettings, AwardsError> {
        let settings = self.get().await?;
        if settings.is_open(self.clock.now()) {
            Ok(settings)
        } else {
            Err(AwardsError::SubmissionsClosed)
        }
    }
}
