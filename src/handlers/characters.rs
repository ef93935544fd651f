// src/handlers/characters.rs
//! Character records used to resolve voices and avatars at submission.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};

use crate::error::StoreError;
use crate::models::Character;
use crate::AppState;

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::CharacterNotFound(name) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("character not found: {}", name) })),
        )
            .into_response(),
        other => {
            tracing::error!("Character store failure: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": other.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /api/characters
pub async fn list_characters(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.job_manager.characters().list_characters().await {
        Ok(characters) => (StatusCode::OK, Json(characters)).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/characters - Create or replace a character
pub async fn put_character(
    Extension(state): Extension<Arc<AppState>>,
    Json(character): Json<Character>,
) -> Response {
    if character.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "character name is empty" })),
        )
            .into_response();
    }
    let character = Character {
        name: character.name.trim().to_string(),
        ..character
    };
    match state.job_manager.characters().put_character(character.clone()).await {
        Ok(()) => {
            tracing::info!("👤 Saved character {}", character.name);
            (StatusCode::CREATED, Json(character)).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// GET /api/characters/:name
pub async fn get_character(
    Path(name): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.characters().get_character(&name).await {
        Ok(character) => (StatusCode::OK, Json(character)).into_response(),
        Err(e) => store_error(e),
    }
}

/// DELETE /api/characters/:name
pub async fn delete_character(
    Path(name): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.characters().delete_character(&name).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => store_error(StoreError::CharacterNotFound(name)),
        Err(e) => store_error(e),
    }
}

pub fn character_routes() -> Router {
    Router::new()
        .route("/api/characters", get(list_characters).post(put_character))
        .route("/api/characters/:name", get(get_character).delete(delete_character))
}
