use crate::calculator::GoalInputs;
use crate::error_report::ErrorReport;
use crate::errors::{AppError, ClientError};
use crate::export::export_file_name;
use crate::state::AppState;
use crate::tracker::{Snapshot, TrackerView};
use crate::ui::render_index;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect},
    Form, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let tracker = state.tracker.lock().await;
    Html(render_index(&tracker.view(), tracker.history()))
}

pub async fn get_goals(State(state): State<AppState>) -> Json<TrackerView> {
    let tracker = state.tracker.lock().await;
    Json(tracker.view())
}

pub async fn put_inputs(
    State(state): State<AppState>,
    Json(inputs): Json<GoalInputs>,
) -> Result<Json<TrackerView>, AppError> {
    inputs.validate().map_err(AppError::bad_request)?;

    let mut tracker = state.tracker.lock().await;
    tracker.update_inputs(inputs, Utc::now()).await?;
    Ok(Json(tracker.view()))
}

pub async fn get_history(State(state): State<AppState>) -> Json<Vec<Snapshot>> {
    let tracker = state.tracker.lock().await;
    Json(tracker.history().to_vec())
}

pub async fn save_snapshot(State(state): State<AppState>) -> Result<Json<Vec<Snapshot>>, AppError> {
    let mut tracker = state.tracker.lock().await;
    tracker.save_snapshot(Utc::now()).await?;
    Ok(Json(tracker.history().to_vec()))
}

pub async fn load_snapshot(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<TrackerView>, AppError> {
    let mut tracker = state.tracker.lock().await;
    tracker.load_snapshot(index, Utc::now()).await?;
    info!(index, "loaded goal snapshot");
    Ok(Json(tracker.view()))
}

pub async fn clear_history(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<StatusCode, AppError> {
    let mut tracker = state.tracker.lock().await;
    tracker.clear_history(query.confirm).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn snapshot_form(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let mut tracker = state.tracker.lock().await;
    tracker.save_snapshot(Utc::now()).await?;
    Ok(Redirect::to("/"))
}

pub async fn clear_history_form(
    State(state): State<AppState>,
    Form(query): Form<ClearQuery>,
) -> Result<Redirect, AppError> {
    let mut tracker = state.tracker.lock().await;
    tracker.clear_history(query.confirm).await?;
    Ok(Redirect::to("/"))
}

pub async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.tracker.lock().await.export_csv()?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(Utc::now().date_naive())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// Relays a crash report to the CRM's auto-fix endpoint under the caller's
/// bearer token. Failures are reported inline; the caller decides whether to
/// resend.
pub async fn error_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<ErrorReport>,
) -> Result<Json<Value>, AppError> {
    let mut crm = state.crm.clone().ok_or(ClientError::NotConfigured)?;
    if let Some(token) = bearer_token(&headers) {
        crm = crm.with_bearer(token);
    }
    match crm.report_error(&report).await {
        Ok(analysis) => {
            info!(url = %report.url, "error report analysed");
            Ok(Json(analysis))
        }
        Err(err) => {
            warn!("error report failed: {err}");
            Err(err.into())
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::router;
    use crate::client::CrmClient;
    use crate::storage::MemoryStore;
    use axum::{routing::post, Router};
    use serde_json::json;
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn auto_fix(
        headers: HeaderMap,
        Json(report): Json<ErrorReport>,
    ) -> Result<Json<Value>, StatusCode> {
        match bearer_token(&headers) {
            Some("user-token") => Ok(Json(json!({"analysis": report.error_message}))),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    async fn app_with_backend() -> String {
        let backend = serve(Router::new().route("/auto-fix-error", post(auto_fix))).await;
        let crm = CrmClient::new(backend);
        let state = AppState::open(Arc::new(MemoryStore::new()), Some(crm)).await;
        serve(router(state)).await
    }

    fn report() -> Value {
        json!({"error_message": "boom", "url": "http://localhost/"})
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[tokio::test]
    async fn error_report_forwards_caller_bearer() {
        let base = app_with_backend().await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/error-report"))
            .bearer_auth("user-token")
            .json(&report())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let analysis: Value = response.json().await.unwrap();
        assert_eq!(analysis["analysis"], "boom");
    }

    #[tokio::test]
    async fn error_report_without_bearer_is_rejected_upstream() {
        let base = app_with_backend().await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/error-report"))
            .json(&report())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    }
}
