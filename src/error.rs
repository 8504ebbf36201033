use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(thiserror::Error, Debug)]
pub enum AwardsError {
    #[error("submission is locked by {holder} until {expires_at}")]
    LockHeld { holder: String, expires_at: String },
    #[error("submission lock is changing hands; try again")]
    LockContended,
    #[error("lock token is no longer current")]
    LockLost,
    #[error("submission not found")]
    NotFound,
    #[error("a submission for {0} already exists at that time")]
    Duplicate(String),
    #[error("primary store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("evaluator password required")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("submissions are closed")]
    SubmissionsClosed,
    #[error("file {name} exceeds the {limit} byte limit")]
    PayloadTooLarge { name: String, limit: usize },
    #[error("object storage error: {0}")]
    Storage(String),
    #[error("backup write failed: {0}")]
    Backup(String),
    #[error("notification failed: {0}")]
    Notify(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl AwardsError {
    /// Failures of the primary store that a write may survive by going to the CSV backup.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            AwardsError::StoreUnavailable(_) | AwardsError::SchemaMismatch(_) | AwardsError::Store(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AwardsError::LockHeld { .. }
            | AwardsError::LockContended
            | AwardsError::LockLost
            | AwardsError::Duplicate(_) => StatusCode::CONFLICT,
            AwardsError::NotFound => StatusCode::NOT_FOUND,
            AwardsError::Unauthorized => StatusCode::UNAUTHORIZED,
            AwardsError::Validation(_) => StatusCode::BAD_REQUEST,
            AwardsError::SubmissionsClosed => StatusCode::FORBIDDEN,
            AwardsError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AwardsError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AwardsError::Storage(_) | AwardsError::Notify(_) => StatusCode::BAD_GATEWAY,
            AwardsError::SchemaMismatch(_)
            | AwardsError::Store(_)
            | AwardsError::Backup(_)
            | AwardsError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AwardsError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                match code.as_str() {
                    "23505" => AwardsError::Duplicate(db.message().to_string()),
                    // insufficient_privilege is an auth problem, not a schema one
                    "42501" => AwardsError::StoreUnavailable(err.to_string()),
                    c if c.starts_with("42") => AwardsError::SchemaMismatch(err.to_string()),
                    c if c.starts_with("08") || c.starts_with("28") || c.starts_with("57") => {
                        AwardsError::StoreUnavailable(err.to_string())
                    }
                    _ => AwardsError::Store(err.to_string()),
                }
            }
            sqlx::Error::RowNotFound => AwardsError::NotFound,
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => AwardsError::SchemaMismatch(err.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AwardsError::StoreUnavailable(err.to_string()),
            _ => AwardsError::Store(err.to_string()),
        }
    }
}

impl From<csv::Error> for AwardsError {
    fn from(err: csv::Error) -> Self {
        AwardsError::Backup(err.to_string())
    }
}

impl From<reqwest::Error> for AwardsError {
    fn from(err: reqwest::Error) -> Self {
        AwardsError::Storage(err.to_string())
    }
}

impl IntoResponse for AwardsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let mut body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        match &self {
            AwardsError::LockHeld { holder, expires_at } => {
                body["holder"] = serde_json::json!(holder);
                body["expires_at"] = serde_json::json!(expires_at);
                body["retryable"] = serde_json::json!(true);
            }
            AwardsError::LockContended => body["retryable"] = serde_json::json!(true),
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}
