use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tera::Context;

use crate::error::AwardsError;
use crate::scoring::Perspective;
use crate::state::AppState;
use crate::submission::{process_submission, SubmissionForm, UploadedFile};

#[derive(Serialize)]
struct PerspectiveView {
    key: &'static str,
    label: &'static str,
    goal: &'static str,
}

fn perspective_views() -> Vec<PerspectiveView> {
    Perspective::ALL
        .into_iter()
        .map(|p| PerspectiveView {
            key: p.key(),
            label: p.label(),
            goal: p.goal(),
        })
        .collect()
}

async fn form_context(state: &AppState) -> Context {
    let mut ctx = Context::new();
    ctx.insert("perspectives", &perspective_views());
    match state.settings.get().await {
        Ok(settings) => {
            ctx.insert("open", &settings.is_open(state.clock.now()));
            ctx.insert(
                "deadline",
                &settings.deadline.map(|d| d.format("%d %B %Y %H:%M UTC").to_string()),
            );
        }
        Err(e) => {
            tracing::warn!("Settings unavailable for form: {}", e);
            ctx.insert("open", &true);
            ctx.insert("deadline", &Option::<String>::None);
        }
    }
    ctx
}

pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ctx = form_context(&state).await;
    render_template("index.html", &ctx)
}

async fn field_text(field: Field<'_>) -> Result<String, AwardsError> {
    let name = field.name().unwrap_or("").to_string();
    field
        .text()
        .await
        .map_err(|e| AwardsError::Validation(format!("Could not read field {}: {}", name, e)))
}

async fn read_form(multipart: &mut Multipart) -> Result<SubmissionForm, AwardsError> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AwardsError::Validation(format!("Malformed upload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "first_name" => form.first_name = field_text(field).await?,
            "last_name" => form.last_name = field_text(field).await?,
            _ => {
                if let Some(key) = name.strip_prefix("action_") {
                    if let Some(p) = Perspective::from_key(key) {
                        let text = field_text(field).await?;
                        form.actions.insert(p.key(), text);
                    }
                } else if let Some(key) = name.strip_prefix("files_") {
                    let Some(perspective) = Perspective::from_key(key) else {
                        continue;
                    };
                    let filename = field.file_name().unwrap_or("").to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AwardsError::Validation(format!("Upload failed: {}", e)))?;
                    // Browsers send an empty part when no file was chosen.
                    if filename.is_empty() || bytes.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile {
                        perspective,
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
        }
    }

    Ok(form)
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let result = match read_form(&mut multipart).await {
        Ok(form) => process_submission(&state, form).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(receipt) => {
            let mut ctx = Context::new();
            ctx.insert("receipt", &receipt);
            ctx.insert("fallback", &receipt.write.used_fallback());
            render_template("submitted.html", &ctx).into_response()
        }
        Err(e) => {
            tracing::warn!("Submission rejected: {}", e);
            let mut ctx = form_context(&state).await;
            ctx.insert("error", &e.to_string());
            (e.status_code(), render_template("index.html", &ctx)).into_response()
        }
    }
}

fn render_template(name: &str, ctx: &Context) -> Html<String> {
    let tera = crate::templates::get_tera();
    let rendered = tera.render(name, ctx).unwrap_or_else(|e| {
        tracing::error!("Template {} failed: {}", name, e);
        format!("Template error: {}", name)
    });
    Html(rendered)
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
