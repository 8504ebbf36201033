mod api;
mod pages;

pub use api::*;
pub use pages::*;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

// Four perspectives of evidence, each file capped at the bucket limit.
const MAX_REQUEST_BYTES: usize = 200 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/submit", post(submit_handler))
        .route("/health", get(health))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/submissions", get(list_submissions))
        .route("/api/submissions/:id", get(get_submission))
        .route(
            "/api/submissions/:id/lock",
            get(lock_state).post(acquire_lock).delete(release_lock),
        )
        .route("/api/submissions/:id/lock/renew", post(renew_lock))
        .route("/api/submissions/:id/evaluation", post(record_evaluation))
        .route("/api/submissions/:id/stage1", post(record_stage1))
        .route("/api/submissions/:id/committee", post(record_committee_vote))
        .route("/api/submissions/:id/status", post(set_status))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::EVALUATOR_HEADER;
    use crate::db::{AwardsStore, MemoryStore};
    use crate::lock::tests::sample_record;
    use crate::submission::tests::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone(), &dir.path().join("backup.csv"));
        TestApp {
            app: router(Arc::new(state)),
            store,
            _dir: dir,
        }
    }

    fn request(method: &str, uri: &str, password: Option<&str>, json: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(password) = password {
            builder = builder.header(EVALUATOR_HEADER, password);
        }
        match json {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn evaluator_routes_need_the_password() {
        let t = test_app();
        t.store.insert_submission(&sample_record("Tariro Moyo")).await.unwrap();

        for (method, uri, json) in [
            ("GET", "/api/submissions", None),
            ("GET", "/api/submissions/1", None),
            ("GET", "/api/submissions/1/lock", None),
            ("POST", "/api/submissions/1/lock", Some(r#"{"holder":"alice"}"#)),
            ("PUT", "/api/settings", Some(r#"{"active":false}"#)),
        ] {
            let (status, body) = send(&t.app, request(method, uri, None, json)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {} without password", method, uri);
            assert_eq!(body["status"], "error");

            let (status, _) = send(&t.app, request(method, uri, Some("wrong"), json)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {} with wrong password", method, uri);
        }

        // Nothing was written by the rejected requests.
        let row = t.store.get_submission(1).await.unwrap().unwrap().record;
        assert!(row.lock_token.is_none());

        let (status, body) = send(&t.app, request("GET", "/api/submissions", Some("pw"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn settings_are_publicly_readable() {
        let t = test_app();
        let (status, body) = send(&t.app, request("GET", "/api/settings", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["open"], true);

        let (status, _) = send(
            &t.app,
            request("PUT", "/api/settings", Some("pw"), Some(r#"{"active":false}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&t.app, request("GET", "/api/settings", None, None)).await;
        assert_eq!(body["open"], false);
        assert_eq!(body["settings"]["active"], false);
    }

    #[tokio::test]
    async fn held_lock_is_a_retryable_conflict() {
        let t = test_app();
        t.store.insert_submission(&sample_record("Tariro Moyo")).await.unwrap();

        let (status, body) = send(
            &t.app,
            request("POST", "/api/submissions/1/lock", Some("pw"), Some(r#"{"holder":"alice"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let expires_at = body["lock"]["expires_at"].clone();
        assert_eq!(expires_at, "2026-02-01T08:02:00.000Z");

        let (status, body) = send(
            &t.app,
            request("POST", "/api/submissions/1/lock", Some("pw"), Some(r#"{"holder":"bob"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["holder"], "alice");
        assert_eq!(body["expires_at"], expires_at);
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn truncated_upload_is_rejected() {
        let t = test_app();
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"first_name\"\r\n\r\n",
            "Tariro\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"last_name\"\r\n\r\n",
            "Moyo\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"action_financial\"\r\n\r\n",
            "Cut fuel costs by re-rou",
        );
        let req = Request::builder()
            .method("POST")
            .uri("/submit")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();

        let response = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(t.store.list_submissions().await.unwrap().is_empty());
    }
}
