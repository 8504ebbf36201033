use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{Action, EvaluatorSession, Role};
use crate::db::{EvaluationUpdate, Recommendation, SubmissionStatus};
use crate::error::AwardsError;
use crate::lock::lock_status;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LockRequest {
    holder: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    token: String,
}

#[derive(Deserialize)]
pub struct EvaluationRequest {
    token: String,
    vote: String,
    #[serde(default)]
    comment: String,
}

#[derive(Deserialize)]
pub struct Stage1Request {
    token: String,
    recommendation: Recommendation,
    #[serde(default)]
    comment: String,
}

#[derive(Deserialize)]
pub struct CommitteeRequest {
    token: String,
    member: String,
    vote: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    token: String,
    status: String,
}

#[derive(Deserialize)]
pub struct SettingsUpdate {
    deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    clear_deadline: bool,
    active: Option<bool>,
}

fn required(value: &str, field: &str) -> Result<String, AwardsError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AwardsError::Validation(format!("{} is required", field)))
    } else {
        Ok(value.to_string())
    }
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::ListSubmissions)?;
    let records = state.submissions.read_records().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "count": records.len(),
        "submissions": records,
    })))
}

pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::ReadSubmission)?;
    let submission = state
        .submissions
        .read_record(id)
        .await?
        .ok_or(AwardsError::NotFound)?;
    let lock = lock_status(
        submission.record.lock_holder.as_deref(),
        submission.record.lock_expiry.as_deref(),
        state.clock.now(),
    );
    Ok(Json(serde_json::json!({
        "status": "ok",
        "submission": submission,
        "lock": lock,
    })))
}

pub async fn lock_state(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::Lock)?;
    let lock = state.locks.status(id).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "lock": lock })))
}

pub async fn acquire_lock(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<LockRequest>,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::Lock)?;
    let grant = state.locks.acquire(id, &req.holder).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "lock": grant })))
}

pub async fn renew_lock(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::Lock)?;
    let grant = state.locks.renew(id, &req.token).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "lock": grant })))
}

pub async fn release_lock(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::Lock)?;
    state.locks.release(id, &req.token).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn apply(
    state: &AppState,
    session: &EvaluatorSession,
    id: i64,
    token: &str,
    update: EvaluationUpdate,
) -> Result<Json<serde_json::Value>, AwardsError> {
    session.authorize(&state.authorizer, Action::Evaluate)?;
    state.locks.update(id, token, &update).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn record_evaluation(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<EvaluationRequest>,
) -> Result<impl IntoResponse, AwardsError> {
    let update = EvaluationUpdate::Evaluation {
        vote: required(&req.vote, "vote")?,
        comment: req.comment.trim().to_string(),
    };
    apply(&state, &session, id, &req.token, update).await
}

pub async fn record_stage1(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<Stage1Request>,
) -> Result<impl IntoResponse, AwardsError> {
    let update = EvaluationUpdate::Stage1 {
        recommendation: req.recommendation,
        comment: req.comment.trim().to_string(),
    };
    apply(&state, &session, id, &req.token, update).await
}

pub async fn record_committee_vote(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<CommitteeRequest>,
) -> Result<impl IntoResponse, AwardsError> {
    let update = EvaluationUpdate::CommitteeVote {
        member: required(&req.member, "member")?,
        vote: required(&req.vote, "vote")?,
    };
    apply(&state, &session, id, &req.token, update).await
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, AwardsError> {
    let status = SubmissionStatus::parse(req.status.trim())
        .ok_or_else(|| AwardsError::Validation(format!("unknown status '{}'", req.status)))?;
    apply(&state, &session, id, &req.token, EvaluationUpdate::Status(status)).await
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AwardsError> {
    state.authorizer.require(Role::Public, Action::ReadSettings)?;
    let settings = state.settings.get().await?;
    let open = settings.is_open(state.clock.now());
    Ok(Json(serde_json::json!({
        "status": "ok",
        "settings": settings,
        "open": open,
    })))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    session: EvaluatorSession,
    Json(req): Json<SettingsUpdate>,
) -> Result<impl IntoResponse, AwardsError> {
    session.authorize(&state.authorizer, Action::WriteSettings)?;
    if req.clear_deadline {
        state.settings.set_deadline(None).await?;
    } else if let Some(deadline) = req.deadline {
        state.settings.set_deadline(Some(deadline)).await?;
    }
    if let Some(active) = req.active {
        state.settings.set_active(active).await?;
    }
    let settings = state.settings.get().await?;
    Ok(Json(serde_json::json!({ "status": "ok", "settings": settings })))
}
