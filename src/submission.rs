use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::auth::{Action, Role};
use crate::backup::WritePath;
use crate::db::{format_timestamp, FileDescriptor, SubmissionRecord, SubmissionStatus};
use crate::error::AwardsError;
use crate::scoring::{score_submission, Perspective, ScoreCard};
use crate::state::AppState;
use crate::storage::{generate_folder_name, guess_content_type, object_path, MAX_OBJECT_BYTES};

pub struct UploadedFile {
    pub perspective: Perspective,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct SubmissionForm {
    pub first_name: String,
    pub last_name: String,
    pub actions: HashMap<&'static str, String>,
    pub files: Vec<UploadedFile>,
}

impl SubmissionForm {
    pub fn action(&self, perspective: Perspective) -> &str {
        self.actions
            .get(perspective.key())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn evidence_count(&self, perspective: Perspective) -> usize {
        self.files
            .iter()
            .filter(|f| f.perspective == perspective)
            .count()
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionReceipt {
    pub name: String,
    pub first_name: String,
    pub card: ScoreCard,
    pub write: WritePath,
}

pub fn build_record(
    name: &str,
    submitted_at: DateTime<Utc>,
    card: &ScoreCard,
    folder_url: Option<String>,
    files: &[FileDescriptor],
) -> SubmissionRecord {
    SubmissionRecord {
        name: name.to_string(),
        submitted_at: format_timestamp(submitted_at),
        total_score: card.total,
        financial_score: card.score(Perspective::Financial),
        financial_action: card.action(Perspective::Financial).to_string(),
        customer_score: card.score(Perspective::Customer),
        customer_action: card.action(Perspective::Customer).to_string(),
        internal_score: card.score(Perspective::InternalBusinessProcesses),
        internal_action: card.action(Perspective::InternalBusinessProcesses).to_string(),
        learning_score: card.score(Perspective::LearningAndGrowth),
        learning_action: card.action(Perspective::LearningAndGrowth).to_string(),
        folder_url,
        files: serde_json::to_string(files).unwrap_or_else(|_| "[]".to_string()),
        evaluator_vote: None,
        evaluator_comment: None,
        stage1_recommendation: None,
        stage1_comment: None,
        committee_votes: None,
        current_status: SubmissionStatus::Submitted.as_str().to_string(),
        lock_token: None,
        lock_expiry: None,
        lock_holder: None,
    }
}

/// Scores, uploads and records one public submission.
pub async fn process_submission(
    state: &AppState,
    form: SubmissionForm,
) -> Result<SubmissionReceipt, AwardsError> {
    state.authorizer.require(Role::Public, Action::Submit)?;
    match state.settings.ensure_open().await {
        Ok(_) => {}
        // The deadline cannot be checked; accept so the write can still reach the backup.
        Err(e) if e.triggers_fallback() => {
            warn!("Settings unavailable ({}); accepting submission", e)
        }
        Err(e) => return Err(e),
    }

    let first_name = form.first_name.trim().to_string();
    let last_name = form.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AwardsError::Validation(
            "Please provide your Name and Surname.".into(),
        ));
    }
    let name = format!("{} {}", first_name, last_name);

    if let Some(big) = form.files.iter().find(|f| f.bytes.len() > MAX_OBJECT_BYTES) {
        return Err(AwardsError::PayloadTooLarge {
            name: big.filename.clone(),
            limit: MAX_OBJECT_BYTES,
        });
    }

    let entries: Vec<(Perspective, String, usize)> = Perspective::ALL
        .into_iter()
        .map(|p| (p, form.action(p).to_string(), form.evidence_count(p)))
        .collect();
    let card = score_submission(&entries);

    let now = state.clock.now();
    let folder = generate_folder_name(&name, now);
    let mut descriptors = Vec::with_capacity(form.files.len());

    for (index, file) in form.files.into_iter().enumerate() {
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&file.filename));
        let size = file.bytes.len();
        let url = match &state.bucket {
            Some(bucket) => {
                state.authorizer.require(Role::Public, Action::UploadAttachment)?;
                let path = object_path(&folder, file.perspective.key(), index, &file.filename);
                Some(bucket.upload(&path, file.bytes, &content_type).await?)
            }
            None => {
                warn!("No object storage configured; {} not stored", file.filename);
                None
            }
        };
        descriptors.push(FileDescriptor {
            name: file.filename,
            url,
            content_type,
            size,
            perspective: file.perspective.key().to_string(),
        });
    }

    let folder_url = state.bucket.as_ref().map(|b| b.folder_url(&folder));
    let record = build_record(&name, now, &card, folder_url.clone(), &descriptors);
    let write = state.submissions.log_submission(&record).await?;
    info!(
        "Submission from {} recorded (total {}, fallback: {})",
        name,
        card.total,
        write.used_fallback()
    );

    if let Some(notifier) = &state.notifier {
        if let Err(e) = notifier
            .notify_submission(&name, &card, &descriptors, folder_url.as_deref())
            .await
        {
            warn!("Submission email for {} not sent: {}", name, e);
        }
    }

    Ok(SubmissionReceipt {
        name,
        first_name,
        card,
        write,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::Authorizer;
    use crate::backup::tests::UnreachableStore;
    use crate::backup::{CsvBackup, SubmissionLog};
    use crate::db::{AwardsStore, MemoryStore};
    use crate::lock::tests::ManualClock;
    use crate::lock::LockManager;
    use crate::settings::SettingsService;
    use chrono::TimeZone;
    use std::path::Path;
    use std::sync::Arc;

    pub(crate) fn test_state(store: Arc<dyn AwardsStore>, backup: &Path) -> AppState {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
        ));
        AppState {
            clock: clock.clone(),
            submissions: SubmissionLog::new(store.clone(), Arc::new(CsvBackup::new(backup))),
            locks: LockManager::new(store.clone(), clock.clone(), 120),
            settings: SettingsService::new(store, clock),
            authorizer: Authorizer::new("pw"),
            bucket: None,
            notifier: None,
        }
    }

    fn form(first: &str, last: &str) -> SubmissionForm {
        let mut form = SubmissionForm {
            first_name: first.into(),
            last_name: last.into(),
            ..Default::default()
        };
        form.actions.insert("financial", "r".repeat(150));
        form.actions.insert("customer", "Renewed the bank contract".into());
        for name in ["a.pdf", "b.pdf"] {
            form.files.push(UploadedFile {
                perspective: Perspective::Financial,
                filename: name.into(),
                content_type: None,
                bytes: b"%PDF-1.4".to_vec(),
            });
        }
        form
    }

    #[tokio::test]
    async fn submission_is_scored_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone(), &dir.path().join("backup.csv"));

        let receipt = process_submission(&state, form(" Tariro ", "Moyo")).await.unwrap();
        assert_eq!(receipt.name, "Tariro Moyo");
        assert_eq!(receipt.write, WritePath::Primary { id: 1 });

        let row = store.get_submission(1).await.unwrap().unwrap().record;
        assert_eq!(row.submitted_at, "2026-02-01T08:00:00.000Z");
        assert_eq!(row.financial_score, 90.0);
        assert_eq!(row.customer_score, 40.0);
        assert_eq!(row.total_score, 32.5);
        assert_eq!(row.current_status, "Submitted");
        assert_eq!(row.folder_url, None);

        let files: Vec<FileDescriptor> = serde_json::from_str(&row.files).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].content_type, "application/pdf");
        assert_eq!(files[0].perspective, "financial");
    }

    #[tokio::test]
    async fn narrative_is_stored_as_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone(), &dir.path().join("backup.csv"));

        let mut form = form("Tariro", "Moyo");
        form.actions.insert("learning", "  Mentored two new guards\n".into());
        process_submission(&state, form).await.unwrap();

        let row = store.get_submission(1).await.unwrap().unwrap().record;
        assert_eq!(row.learning_action, "  Mentored two new guards\n");
        assert_eq!(row.learning_score, 40.0);
    }

    #[tokio::test]
    async fn missing_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(Arc::new(MemoryStore::new()), &dir.path().join("backup.csv"));
        assert!(matches!(
            process_submission(&state, form("Tariro", "  ")).await,
            Err(AwardsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn closed_submissions_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(Arc::new(MemoryStore::new()), &dir.path().join("backup.csv"));
        state.settings.set_active(false).await.unwrap();
        assert!(matches!(
            process_submission(&state, form("Tariro", "Moyo")).await,
            Err(AwardsError::SubmissionsClosed)
        ));
    }

    #[tokio::test]
    async fn unreachable_store_lands_in_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let state = test_state(Arc::new(UnreachableStore), &path);

        let receipt = process_submission(&state, form("Tariro", "Moyo")).await.unwrap();
        assert!(receipt.write.used_fallback());

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<SubmissionRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Tariro Moyo");
        assert_eq!(rows[0].financial_score, 90.0);
    }

    #[test]
    fn record_starts_unlocked_and_submitted() {
        let card = score_submission(&[]);
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let record = build_record("A B", at, &card, None, &[]);
        assert_eq!(record.files, "[]");
        assert_eq!(record.current_status, "Submitted");
        assert!(record.lock_token.is_none() && record.lock_expiry.is_none());
    }
}
