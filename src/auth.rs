//! Application-level authorization. The backing tables and bucket are open
//! to the public role, so every evaluator-only operation is gated here.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::AwardsError;
use crate::state::AppState;

pub const EVALUATOR_HEADER: &str = "x-evaluator-password";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Public,
    Evaluator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit,
    UploadAttachment,
    ReadSettings,
    WriteSettings,
    ListSubmissions,
    ReadSubmission,
    Lock,
    Evaluate,
}

pub fn is_allowed(role: Role, action: Action) -> bool {
    match action {
        Action::Submit | Action::UploadAttachment | Action::ReadSettings => true,
        Action::WriteSettings
        | Action::ListSubmissions
        | Action::ReadSubmission
        | Action::Lock
        | Action::Evaluate => role == Role::Evaluator,
    }
}

pub struct Authorizer {
    password_digest: [u8; 32],
}

impl Authorizer {
    pub fn new(evaluator_password: &str) -> Self {
        Self {
            password_digest: Sha256::digest(evaluator_password.as_bytes()).into(),
        }
    }

    /// Resolves the caller's role from the supplied password, if any.
    pub fn role_for(&self, supplied: Option<&str>) -> Role {
        match supplied {
            Some(password) if self.matches(password) => Role::Evaluator,
            _ => Role::Public,
        }
    }

    // Digests are fixed-length, and the fold touches every byte.
    fn matches(&self, supplied: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(supplied.as_bytes()).into();
        digest
            .iter()
            .zip(self.password_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    pub fn require(&self, role: Role, action: Action) -> Result<(), AwardsError> {
        if is_allowed(role, action) {
            Ok(())
        } else {
            Err(AwardsError::Unauthorized)
        }
    }
}

/// Extractor for evaluator-only handlers. Rejects the request unless the
/// evaluator password header is present and correct.
pub struct EvaluatorSession {
    role: Role,
}

impl EvaluatorSession {
    pub fn authorize(&self, authorizer: &Authorizer, action: Action) -> Result<(), AwardsError> {
        authorizer.require(self.role, action)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for EvaluatorSession {
    type Rejection = AwardsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let supplied = parts
            .headers
            .get(EVALUATOR_HEADER)
            .and_then(|v| v.to_str().ok());
        match state.authorizer.role_for(supplied) {
            Role::Evaluator => Ok(EvaluatorSession {
                role: Role::Evaluator,
            }),
            Role::Public => {
                tracing::warn!("Rejected evaluator request without valid password");
                Err(AwardsError::Unauthorized)
            }
        }
    }
}
