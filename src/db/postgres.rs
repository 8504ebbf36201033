use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    format_timestamp, AwardsStore, EvaluationUpdate, Submission, SubmissionRecord, SubmissionStatus,
};
use crate::error::AwardsError;

// $1 = id, $2 = token, $3 = now. An unparsable expiry is not a live lock.
const HOLDS_LOCK: &str =
    "id = $1 AND lock_token = $2 AND md_awards_lock_expiry(lock_expiry) > $3";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AwardsStore for PgStore {
    async fn insert_submission(&self, record: &SubmissionRecord) -> Result<i64, AwardsError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO md_awards_submissions (
                name, submitted_at, total_score,
                financial_score, financial_action,
                customer_score, customer_action,
                internal_score, internal_action,
                learning_score, learning_action,
                folder_url, files,
                evaluator_vote, evaluator_comment,
                stage1_recommendation, stage1_comment,
                committee_votes, current_status,
                lock_token, lock_expiry, lock_holder
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22)
            RETURNING id
            "#,
        )
        .bind(&record.name)
        .bind(&record.submitted_at)
        .bind(record.total_score)
        .bind(record.financial_score)
        .bind(&record.financial_action)
        .bind(record.customer_score)
        .bind(&record.customer_action)
        .bind(record.internal_score)
        .bind(&record.internal_action)
        .bind(record.learning_score)
        .bind(&record.learning_action)
        .bind(&record.folder_url)
        .bind(&record.files)
        .bind(&record.evaluator_vote)
        .bind(&record.evaluator_comment)
        .bind(&record.stage1_recommendation)
        .bind(&record.stage1_comment)
        .bind(&record.committee_votes)
        .bind(&record.current_status)
        .bind(&record.lock_token)
        .bind(&record.lock_expiry)
        .bind(&record.lock_holder)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>, AwardsError> {
        let rows = sqlx::query_as::<_, Submission>(
            "SELECT * FROM md_awards_submissions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, AwardsError> {
        let row = sqlx::query_as::<_, Submission>("SELECT * FROM md_awards_submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn try_acquire_lock(
        &self,
        id: i64,
        holder: &str,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError> {
        let result = sqlx::query(
            r#"
            UPDATE md_awards_submissions
            SET lock_token = $2, lock_expiry = $3, lock_holder = $4
            WHERE id = $1
              AND (lock_token IS NULL
                   OR md_awards_lock_expiry(lock_expiry) IS NULL
                   OR md_awards_lock_expiry(lock_expiry) <= $5
                   OR lock_holder = $4)
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(format_timestamp(expires_at))
        .bind(holder)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn renew_lock(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError> {
        let sql = format!("UPDATE md_awards_submissions SET lock_expiry = $4 WHERE {HOLDS_LOCK}");
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(token)
            .bind(now)
            .bind(format_timestamp(expires_at))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_lock(&self, id: i64, token: &str) -> Result<bool, AwardsError> {
        let result = sqlx::query(
            r#"
            UPDATE md_awards_submissions
            SET lock_token = NULL, lock_expiry = NULL, lock_holder = NULL
            WHERE id = $1 AND lock_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_update(
        &self,
        id: i64,
        token: &str,
        update: &EvaluationUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, AwardsError> {
        let result = match update {
            EvaluationUpdate::Evaluation { vote, comment } => {
                let sql = format!(
                    r#"
                    UPDATE md_awards_submissions
                    SET evaluator_vote = $4,
                        evaluator_comment = $5,
                        current_status = CASE WHEN current_status = $6 THEN $7 ELSE current_status END
                    WHERE {HOLDS_LOCK}
                    "#
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(token)
                    .bind(now)
                    .bind(vote)
                    .bind(comment)
                    .bind(SubmissionStatus::Submitted.as_str())
                    .bind(SubmissionStatus::UnderReview.as_str())
                    .execute(&self.pool)
                    .await?
            }
            EvaluationUpdate::Stage1 { recommendation, comment } => {
                let sql = format!(
                    r#"
                    UPDATE md_awards_submissions
                    SET stage1_recommendation = $4, stage1_comment = $5, current_status = $6
                    WHERE {HOLDS_LOCK}
                    "#
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(token)
                    .bind(now)
                    .bind(recommendation.as_str())
                    .bind(comment)
                    .bind(recommendation.status().as_str())
                    .execute(&self.pool)
                    .await?
            }
            EvaluationUpdate::CommitteeVote { member, vote } => {
                // Merged inside the UPDATE so concurrent members never overwrite each other.
                let sql = format!(
                    r#"
                    UPDATE md_awards_submissions
                    SET committee_votes = (
                            COALESCE(NULLIF(committee_votes, ''), '{{}}')::jsonb
                            || jsonb_build_object($4::text, $5::text)
                        )::text,
                        current_status = CASE
                            WHEN current_status IN ($6, $7) THEN current_status
                            ELSE $8
                        END
                    WHERE {HOLDS_LOCK}
                    "#
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(token)
                    .bind(now)
                    .bind(member)
                    .bind(vote)
                    .bind(SubmissionStatus::Awarded.as_str())
                    .bind(SubmissionStatus::NotAwarded.as_str())
                    .bind(SubmissionStatus::CommitteeReview.as_str())
                    .execute(&self.pool)
                    .await?
            }
            EvaluationUpdate::Status(status) => {
                let sql =
                    format!("UPDATE md_awards_submissions SET current_status = $4 WHERE {HOLDS_LOCK}");
                sqlx::query(&sql)
                    .bind(id)
                    .bind(token)
                    .bind(now)
                    .bind(status.as_str())
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, AwardsError> {
        let value = sqlx::query_scalar::<_, Option<String>>(
            "SELECT setting_value FROM md_awards_settings WHERE setting_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.flatten())
    }

    async fn put_setting(&self, key: &str, value: Option<&str>) -> Result<(), AwardsError> {
        sqlx::query(
            r#"
            INSERT INTO md_awards_settings (setting_key, setting_value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (setting_key)
            DO UPDATE SET setting_value = EXCLUDED.setting_value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
