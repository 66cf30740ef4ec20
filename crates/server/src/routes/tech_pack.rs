use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::tech_pack::{TechPackAsset, TechPackKind};
use services::services::tech_pack::TechPackAction;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// GET /api/products/{product_id}/tech-pack
pub async fn get_tech_pack(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<TechPackAsset>>>, ApiError> {
    let assets = state.tech_pack.summary(product_id).await?;
    Ok(ResponseJson(ApiResponse::success(assets)))
}

/// POST /api/products/{product_id}/tech-pack/{kind}
///
/// Direct (non-chat) generation of one tech pack section.
pub async fn generate_section(
    State(state): State<AppState>,
    Path((product_id, kind)): Path<(Uuid, TechPackKind)>,
) -> Result<ResponseJson<ApiResponse<Vec<TechPackAsset>>>, ApiError> {
    let assets = state
        .tech_pack
        .execute(product_id, TechPackAction::Single(kind))
        .await?;
    Ok(ResponseJson(ApiResponse::success(assets)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products/{product_id}/tech-pack", get(get_tech_pack))
        .route(
            "/products/{product_id}/tech-pack/{kind}",
            post(generate_section),
        )
}
