//! Routes for the progressive generation workflow.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use services::services::workflow::{
    DecisionOutcome, FrontViewDecision, FrontViewOutcome, SessionSnapshot,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Clone, Deserialize, TS)]
pub struct GenerateFrontViewRequest {
    pub prompt: String,
    #[serde(default)]
    pub is_edit: bool,
    pub previous_front_view_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct FrontViewDecisionRequest {
    pub approval_id: Uuid,
    pub action: FrontViewDecision,
    pub edit_feedback: Option<String>,
    pub selected_revision_number: Option<i64>,
}

/// GET /api/products/{product_id}/generation/state
pub async fn get_state(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<SessionSnapshot>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(
        state.workflow.snapshot(product_id),
    )))
}

/// POST /api/products/{product_id}/generation/front-view
pub async fn generate_front_view(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    axum::Json(payload): axum::Json<GenerateFrontViewRequest>,
) -> Result<ResponseJson<ApiResponse<FrontViewOutcome>>, ApiError> {
    let outcome = state
        .workflow
        .generate_front_view_only(
            product_id,
            &payload.prompt,
            payload.is_edit,
            payload.previous_front_view_url,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

/// POST /api/products/{product_id}/generation/decision
pub async fn decide_front_view(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    axum::Json(payload): axum::Json<FrontViewDecisionRequest>,
) -> Result<ResponseJson<ApiResponse<DecisionOutcome>>, ApiError> {
    let outcome = state
        .workflow
        .handle_front_view_decision(
            product_id,
            payload.approval_id,
            payload.action,
            payload.edit_feedback,
            payload.selected_revision_number,
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

/// POST /api/products/{product_id}/generation/reset
pub async fn reset(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<SessionSnapshot>>, ApiError> {
    state.workflow.reset(product_id);
    Ok(ResponseJson(ApiResponse::success(
        state.workflow.snapshot(product_id),
    )))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/products/{product_id}/generation",
        Router::new()
            .route("/state", get(get_state))
            .route("/front-view", post(generate_front_view))
            .route("/decision", post(decide_front_view))
            .route("/reset", post(reset)),
    )
}
