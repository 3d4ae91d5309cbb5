use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use reviewq_core::types::CardId;

use crate::engine::{Callbacks, MutationOutcome};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct EditBody {
    #[serde(alias = "proposedAction")]
    pub content: String,
}

/// POST /api/cards/:id/approve
pub async fn approve(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MutationOutcome>, AppError> {
    let outcome = app
        .engine
        .approve(&CardId::from(id), Callbacks::new())
        .await?;
    Ok(Json(outcome))
}

/// POST /api/cards/:id/override
pub async fn override_card(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<MutationOutcome>, AppError> {
    let outcome = app
        .engine
        .override_card(&CardId::from(id), &body.reason, Callbacks::new())
        .await?;
    Ok(Json(outcome))
}

/// POST /api/cards/:id/edit
pub async fn edit(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EditBody>,
) -> Result<Json<MutationOutcome>, AppError> {
    let outcome = app
        .engine
        .edit(&CardId::from(id), &body.content, Callbacks::new())
        .await?;
    Ok(Json(outcome))
}

/// POST /api/cards/:id/escalate
pub async fn escalate(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<MutationOutcome>, AppError> {
    let outcome = app
        .engine
        .escalate(&CardId::from(id), &body.reason, Callbacks::new())
        .await?;
    Ok(Json(outcome))
}
