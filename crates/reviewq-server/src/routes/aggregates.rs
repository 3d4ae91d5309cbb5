use axum::extract::State;
use axum::Json;

use crate::engine::Aggregates;
use crate::state::AppState;

/// GET /api/aggregates: counts, efficiency, global status and any drift
/// between the counts and the cached lists.
pub async fn get_aggregates(State(app): State<AppState>) -> Json<Aggregates> {
    Json(app.engine.aggregates().await)
}
