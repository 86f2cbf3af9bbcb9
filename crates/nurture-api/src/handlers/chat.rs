//! Chatbot proxy.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::chat::validate_prompt;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

/// POST /api/v1/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<ApiResponse<ChatReply>, ApiError> {
    let Json(req) = payload?;
    let generator = state.chat.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable("The chatbot is not configured".to_string())
    })?;
    let prompt = validate_prompt(&req.prompt)?;

    tracing::debug!(account = %user.id, chars = prompt.chars().count(), "Chat prompt received");
    let reply = generator.generate(prompt).await?;
    Ok(ApiResponse::ok(ChatReply { reply }, "Response generated successfully"))
}
