use axum::extract::State;
use axum::Json;

use reviewq_core::types::ConversationThread;

use crate::engine::Loaded;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/conversation: the thread behind the selected card.
pub async fn get_conversation(
    State(app): State<AppState>,
) -> Result<Json<Loaded<ConversationThread>>, AppError> {
    app.engine
        .conversation()
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("no card is selected"))
}
