use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use reviewq_core::selection::Selection;
use reviewq_core::types::{CardId, QueueFilter, ViewBucket};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SelectionBody {
    pub view: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectCardBody {
    pub card_id: Option<String>,
}

/// GET /api/selection
pub async fn get_selection(State(app): State<AppState>) -> Json<Selection> {
    Json(app.engine.selection())
}

/// PUT /api/selection: change the view and/or filter. Either change clears
/// the selected card.
pub async fn put_selection(
    State(app): State<AppState>,
    Json(body): Json<SelectionBody>,
) -> Result<Json<Selection>, AppError> {
    let view = body.view.as_deref().map(str::parse::<ViewBucket>).transpose()?;
    let filter = body
        .filter
        .as_deref()
        .map(str::parse::<QueueFilter>)
        .transpose()?;
    let mut selection = app.engine.selection();
    if let Some(view) = view {
        selection = app.engine.set_view(view);
    }
    if let Some(filter) = filter {
        selection = app.engine.set_filter(filter);
    }
    Ok(Json(selection))
}

/// POST /api/selection/card: select a listed card, or clear with `null`.
pub async fn select_card(
    State(app): State<AppState>,
    Json(body): Json<SelectCardBody>,
) -> Result<Json<Selection>, AppError> {
    let selection = match body.card_id {
        Some(id) => app.engine.select_card(&CardId::from(id))?,
        None => app.engine.clear_selection(),
    };
    Ok(Json(selection))
}
