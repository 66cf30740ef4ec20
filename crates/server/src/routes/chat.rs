use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::chat_message::ChatMessage;
use services::services::chat::{SendMessage, SendOutcome};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// GET /api/products/{product_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ChatMessage>>>, ApiError> {
    let messages = state.chat.transcript(product_id).await?;
    Ok(ResponseJson(ApiResponse::success(messages)))
}

/// POST /api/products/{product_id}/messages
///
/// The chat entry point: classifies the message and routes it to a design
/// edit, a tech pack action, a try-on, or a conversational reply.
pub async fn send_message(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    axum::Json(payload): axum::Json<SendMessage>,
) -> Result<ResponseJson<ApiResponse<SendOutcome>>, ApiError> {
    let outcome = state.chat.send_user_message(product_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/products/{product_id}/messages",
        get(get_messages).post(send_message),
    )
}
