// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GridPulse.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Read-only JSON view of the entity registry

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use gridpulse_core::{EntityRecord, EntityRegistry, InstallationSummary};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ApiState {
    pub entities: EntityRegistry,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/states", get(list_states))
        .route("/api/states/{entity_id}", get(get_state))
        .route("/api/installations", get(list_installations))
        .with_state(state)
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn list_states(State(state): State<ApiState>) -> Json<Vec<EntityRecord>> {
    Json(state.entities.list())
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn get_state(State(state): State<ApiState>, Path(entity_id): Path<String>) -> Response {
    match state.entities.get(&entity_id) {
        Some(record) => Json(record).into_response(),
        None => {
            debug!(entity_id = %entity_id, "Unknown entity requested");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("Entity not found: {entity_id}") })),
            )
                .into_response()
        }
    }
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn list_installations(State(state): State<ApiState>) -> Json<Vec<InstallationSummary>> {
    Json(state.entities.list_installations())
}
