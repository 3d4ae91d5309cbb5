use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

/// POST /api/focus: the window regained focus; refetch whatever is stale.
pub async fn focus(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let refetching: Vec<String> = app.engine.focus().iter().map(|k| k.to_string()).collect();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "refetching": refetching })),
    )
}
