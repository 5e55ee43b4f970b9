use crate::error_report::panic_message;
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/snapshot", post(handlers::snapshot_form))
        .route("/history/clear", post(handlers::clear_history_form))
        .route("/api/goals", get(handlers::get_goals))
        .route("/api/goals/inputs", put(handlers::put_inputs))
        .route(
            "/api/goals/history",
            get(handlers::get_history)
                .post(handlers::save_snapshot)
                .delete(handlers::clear_history),
        )
        .route("/api/goals/history/:index/load", post(handlers::load_snapshot))
        .route("/api/goals/export.csv", get(handlers::export_csv))
        .route("/api/error-report", post(handlers::error_report))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    error!("handler panicked: {message}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message, "reportable": true })),
    )
        .into_response()
}
