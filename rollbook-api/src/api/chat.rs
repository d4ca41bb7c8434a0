//! Chat endpoint: natural-language questions over the attendance data
//!
//! A missing chat credential degrades this endpoint only; attendance and
//! student endpoints never depend on the external service.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::services::translator::{self, ChatTurn};
use crate::AppState;

/// POST /api/chat body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "conversationHistory", default)]
    pub conversation_history: Vec<ChatTurn>,
}

/// POST /api/chat
pub async fn process_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Message is required".to_string()))?;

    let Some(translator) = &state.translator else {
        return Err(ApiError::Upstream(translator::NOT_CONFIGURED.to_string()));
    };

    tracing::debug!(
        history_len = request.conversation_history.len(),
        "Chat request received"
    );

    let reply = translator
        .chat_turn(&state.db, message, &request.conversation_history)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": reply.message,
        "data": reply.data,
    })))
}

/// Build chat routes
pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/api/chat", post(process_chat))
}
