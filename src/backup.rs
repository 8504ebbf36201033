//! Write-side safety net: submissions that the primary store refuses are
//! appended to a local CSV file with the same columns as the table.
//! Rows that land here are reconciled by an operator; nothing reads them back.

use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::db::{AwardsStore, Submission, SubmissionRecord};
use crate::error::AwardsError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum WritePath {
    Primary { id: i64 },
    Fallback { file: PathBuf, reason: String },
}

impl WritePath {
    pub fn used_fallback(&self) -> bool {
        matches!(self, WritePath::Fallback { .. })
    }
}

pub struct CsvBackup {
    path: PathBuf,
    // Serializes appends so the header is written once and rows never interleave.
    guard: Mutex<()>,
}

impl CsvBackup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SubmissionRecord) -> Result<(), AwardsError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| AwardsError::Backup("backup writer poisoned".into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AwardsError::Backup(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AwardsError::Backup(e.to_string()))?;
        let is_new = file
            .metadata()
            .map_err(|e| AwardsError::Backup(e.to_string()))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(record)?;
        writer
            .flush()
            .map_err(|e| AwardsError::Backup(e.to_string()))?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SubmissionLog {
    store: Arc<dyn AwardsStore>,
    backup: Arc<CsvBackup>,
}

impl SubmissionLog {
    pub fn new(store: Arc<dyn AwardsStore>, backup: Arc<CsvBackup>) -> Self {
        Self { store, backup }
    }

    /// Writes to the primary store, or to the CSV backup when the store fails.
    /// Errors only when neither write lands, or when the store rejects the row itself.
    pub async fn log_submission(&self, record: &SubmissionRecord) -> Result<WritePath, AwardsError> {
        match self.store.insert_submission(record).await {
            Ok(id) => {
                info!("Submission {} stored for {}", id, record.name);
                Ok(WritePath::Primary { id })
            }
            Err(e) if e.triggers_fallback() => {
                warn!(
                    "Primary store write failed for {} ({}); writing to {}",
                    record.name,
                    e,
                    self.backup.path().display()
                );
                self.backup.append(record)?;
                Ok(WritePath::Fallback {
                    file: self.backup.path().to_path_buf(),
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Reads from the primary store only.
    pub async fn read_records(&self) -> Result<Vec<Submission>, AwardsError> {
        self.store.list_submissions().await
    }

    pub async fn read_record(&self, id: i64) -> Result<Option<Submission>, AwardsError> {
        self.store.get_submission(id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{EvaluationUpdate, MemoryStore};
    use crate::lock::tests::sample_record;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    pub(crate) struct UnreachableStore;

    fn down<T>() -> Result<T, AwardsError> {
        Err(AwardsError::StoreUnavailable("connection refused".into()))
    }

    #[async_trait]
    impl AwardsStore for UnreachableStore {
        async fn insert_submission(&self, _: &SubmissionRecord) -> Result<i64, AwardsError> {
            down()
        }
        async fn list_submissions(&self) -> Result<Vec<Submission>, AwardsError> {
            down()
        }
        async fn get_submission(&self, _: i64) -> Result<Option<Submission>, AwardsError> {
            down()
        }
        async fn try_acquire_lock(
            &self,
            _: i64,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<bool, AwardsError> {
            down()
        }
        async fn renew_lock(
            &self,
            _: i64,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<bool, AwardsError> {
            down()
        }
        async fn release_lock(&self, _: i64, _: &str) -> Result<bool, AwardsError> {
            down()
        }
        async fn apply_update(
            &self,
            _: i64,
            _: &str,
            _: &EvaluationUpdate,
            _: DateTime<Utc>,
        ) -> Result<bool, AwardsError> {
            down()
        }
        async fn get_setting(&self, _: &str) -> Result<Option<String>, AwardsError> {
            down()
        }
        async fn put_setting(&self, _: &str, _: Option<&str>) -> Result<(), AwardsError> {
            down()
        }
    }

    fn read_backup(path: &Path) -> Vec<SubmissionRecord> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.deserialize().map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn unreachable_store_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup").join("md_awards_backup.csv");
        let log = SubmissionLog::new(Arc::new(UnreachableStore), Arc::new(CsvBackup::new(&path)));

        let mut record = sample_record("Rudo Chikore");
        record.folder_url = Some("https://files.example/20260201_rudo".into());
        record.files = r#"[{"name":"a, b.pdf","url":null,"content_type":"application/pdf","size":3,"perspective":"financial"}]"#.into();
        record.financial_action = "Line one\nline \"two\"".into();

        let written = log.log_submission(&record).await.unwrap();
        assert!(written.used_fallback());
        match &written {
            WritePath::Fallback { file, reason } => {
                assert_eq!(file, &path);
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }

        let rows = read_backup(&path);
        assert_eq!(rows, vec![record]);
    }

    #[tokio::test]
    async fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let log = SubmissionLog::new(Arc::new(UnreachableStore), Arc::new(CsvBackup::new(&path)));

        log.log_submission(&sample_record("A")).await.unwrap();
        log.log_submission(&sample_record("B")).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("submitted_at").count(), 1);
        let names: Vec<String> = read_backup(&path).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn healthy_store_skips_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let store = Arc::new(MemoryStore::new());
        let log = SubmissionLog::new(store.clone(), Arc::new(CsvBackup::new(&path)));

        let written = log.log_submission(&sample_record("Chipo")).await.unwrap();
        assert_eq!(written, WritePath::Primary { id: 1 });
        assert!(!path.exists());
        assert_eq!(log.read_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_is_rejected_not_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let log = SubmissionLog::new(Arc::new(MemoryStore::new()), Arc::new(CsvBackup::new(&path)));

        log.log_submission(&sample_record("Chipo")).await.unwrap();
        assert!(matches!(
            log.log_submission(&sample_record("Chipo")).await,
            Err(AwardsError::Duplicate(_))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reads_do_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let log = SubmissionLog::new(Arc::new(UnreachableStore), Arc::new(CsvBackup::new(&path)));
        log.log_submission(&sample_record("A")).await.unwrap();

        assert!(matches!(
            log.read_records().await,
            Err(AwardsError::StoreUnavailable(_))
        ));
    }
}
