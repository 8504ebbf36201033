use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{
    format_timestamp, parse_timestamp, AwardsStore, EvaluationUpdate, Submission, SubmissionRecord,
    SubmissionStatus,
};
use crate::error::AwardsError;

#[derive(Default)]
struct Tables {
    submissions: BTreeMap<i64, SubmissionRecord>,
    settings: HashMap<String, Option<String>>,
    next_id: i64,
}

/// Process-local store with the same conditional-write semantics as [`super::PgStore`].
/// Each operation runs inside one critical section.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn holds_lock(record: &SubmissionRecord, token: &str, now: DateTime<Utc>) -> bool {
    record.lock_token.as_deref() == Some(token)
        && record
            .lock_expiry
            .as_deref()
            .and_then(parse_timestamp)
            .is_some_and(|expiry| now < expiry)
}

// An unparsable expiry counts as free, as in `md_awards_lock_expiry` on Postgres.
fn lock_is_free(record: &SubmissionRecord, holder: &str, now: DateTime<Utc>) -> bool {
    if record.lock_token.is_none() || record.lock_holder.as_deref() == Some(holder) {
        return true;
    }
    match record.lock_expiry.as_deref().and_then(parse_timestamp) {
        Some(expiry) => expiry <= now,
        None => true,
    }
}

fn merge_committee_vote(existing: Option<&str>, member: &str, vote: &str) -> String {
    let mut votes: BTreeMap<String, String> = existing
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    votes.insert(member.to_string(), vote.to_string());
    serde_json::to_string(&votes).unwrap_or_else(|_| "{}".to_string())
}

#[async_trait]
impl AwardsStore for MemoryStore {
    async fn insert_submission(&self, record: &SubmissionRecord) -> Result<i64, AwardsError> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables
            .submissions
            .values()
            .any(|r| r.name == record.name && r.submitted_at == record.submitted_at);
        if duplicate {
            return Err(AwardsError::Duplicate(record.name.clone()));
        }
        tables.next_id += 1;
        let id = tables.next_id;
        tables.submissions.insert(id, record.clone());
        Ok(id)
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>, AwardsError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .submissions
            .iter()
            .map(|(id, record)| Submission {
                id: *id,
                record: record.clone(),
            })
            .collect())
    }

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, AwardsError> {
        let tables = self.tables.lock().await;
        Ok(tables.submissions.get(&id).map(|record| Submission {
            id,
            record: record.clone(),
        }))
    }

    async fn try_acquire_lock(
        &self,
        id: i64,
        holder: &str,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.submissions.get_mut(&id) else {
            return Ok(false);
        };
        if !lock_is_free(record, holder, now) {
            return Ok(false);
        }
        record.lock_token = Some(token.to_string());
        record.lock_expiry = Some(format_timestamp(expires_at));
        record.lock_holder = Some(holder.to_string());
        Ok(true)
    }

    async fn renew_lock(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError> {
        let mut tables = self.tables.lock().await;
        match tables.submissions.get_mut(&id) {
            Some(record) if holds_lock(record, token, now) => {
                record.lock_expiry = Some(format_timestamp(expires_at));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, id: i64, token: &str) -> Result<bool, AwardsError> {
        let mut tables = self.tables.lock().await;
        match tables.submissions.get_mut(&id) {
            Some(record) if record.lock_token.as_deref() == Some(token) => {
                record.lock_token = None;
                record.lock_expiry = None;
                record.lock_holder = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_update(
        &self,
        id: i64,
        token: &str,
        update: &EvaluationUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.submissions.get_mut(&id) else {
            return Ok(false);
        };
        if !holds_lock(record, token, now) {
            return Ok(false);
        }
        match update {
            EvaluationUpdate::Evaluation { vote, comment } => {
                record.evaluator_vote = Some(vote.clone());
                record.evaluator_comment = Some(comment.clone());
                if record.current_status == SubmissionStatus::Submitted.as_str() {
                    record.current_status = SubmissionStatus::UnderReview.as_str().to_string();
                }
            }
            EvaluationUpdate::Stage1 { recommendation, comment } => {
                record.stage1_recommendation = Some(recommendation.as_str().to_string());
                record.stage1_comment = Some(comment.clone());
                record.current_status = recommendation.status().as_str().to_string();
            }
            EvaluationUpdate::CommitteeVote { member, vote } => {
                record.committee_votes = Some(merge_committee_vote(
                    record.committee_votes.as_deref(),
                    member,
                    vote,
                ));
                let is_final = SubmissionStatus::parse(&record.current_status)
                    .is_some_and(|s| s.is_final());
                if !is_final {
                    record.current_status = SubmissionStatus::CommitteeReview.as_str().to_string();
                }
            }
            EvaluationUpdate::Status(status) => {
                record.current_status = status.as_str().to_string();
            }
        }
        Ok(true)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, AwardsError> {
        let tables = self.tables.lock().await;
        Ok(tables.settings.get(key).cloned().flatten())
    }

    async fn put_setting(&self, key: &str, value: Option<&str>) -> Result<(), AwardsError> {
        let mut tables = self.tables.lock().await;
        tables
            .settings
            .insert(key.to_string(), value.map(str::to_string));
        Ok(())
    }
}
