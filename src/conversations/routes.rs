//! Conversation list endpoints.

use std::collections::HashSet;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, warn};

use super::model::Conversation;
use crate::auth::CurrentUser;
use crate::error::{ApiError, StorageError, json_body};
use crate::server::AppState;

const ACCESS_FAILED: &str = "Failed to access conversations";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations)
                .put(replace_conversations)
                .post(create_conversation),
        )
        .route("/api/conversations/{id}", delete(delete_conversation))
}

fn storage_failure(op: &str, e: StorageError) -> ApiError {
    error!(op, error = %e, "Conversation storage failed");
    ApiError::internal(ACCESS_FAILED)
}

async fn list_conversations(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .conversations
        .list(&user_id)
        .await
        .map_err(|e| storage_failure("list", e))?;
    Ok(Json(conversations))
}

async fn replace_conversations(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    conversations: Result<Json<Vec<Conversation>>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversations = json_body(conversations, ACCESS_FAILED)?;
    let mut seen = HashSet::new();
    let total = conversations.len();
    let conversations: Vec<Conversation> = conversations
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    if conversations.len() != total {
        warn!(user_id = %user_id, dropped = total - conversations.len(), "Dropped duplicate conversation ids");
    }

    state
        .conversations
        .replace_all(&user_id, conversations)
        .await
        .map_err(|e| storage_failure("replace_all", e))?;
    Ok(Json(json!({ "success": true })))
}

async fn create_conversation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let conversation = state
        .conversations
        .create(&user_id)
        .await
        .map_err(|e| storage_failure("create", e))?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn delete_conversation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .conversations
        .delete(&user_id, &id)
        .await
        .map_err(|e| storage_failure("delete", e))?;
    if !deleted {
        return Err(ApiError::not_found("Conversation not found"));
    }
    Ok(Json(json!({ "success": true })))
}
