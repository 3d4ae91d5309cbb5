use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use reviewq_core::cache::QueueKey;
use reviewq_core::types::{QueueFilter, ViewBucket};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
    pub filter: Option<String>,
}

/// GET /api/queue: the slice for the active selection. `status` and
/// `filter` override either half without changing the selection.
pub async fn get_queue(
    State(app): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let selected = app.engine.selection().queue_key();
    let status = match query.status.as_deref() {
        Some(s) => s.parse::<ViewBucket>()?,
        None => selected.status,
    };
    let filter = match query.filter.as_deref() {
        Some(f) => f.parse::<QueueFilter>()?,
        None => selected.filter,
    };
    let loaded = app.engine.queue(QueueKey::new(status, filter)).await;
    Ok(Json(serde_json::json!({
        "status": status,
        "filter": filter,
        "cards": loaded.data.as_ref().map(|p| &p.cards),
        "counts": loaded.data.as_ref().and_then(|p| p.counts),
        "error": loaded.error.as_ref().map(|e| e.user_message()),
    })))
}
