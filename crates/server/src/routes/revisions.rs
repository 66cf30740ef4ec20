use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::revision::Revision;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// GET /api/products/{product_id}/revisions
pub async fn list_revisions(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Revision>>>, ApiError> {
    let revisions = Revision::find_live_by_product(&state.db.pool, product_id).await?;
    Ok(ResponseJson(ApiResponse::success(revisions)))
}

/// POST /api/products/{product_id}/revisions/{revision_number}/activate
///
/// Rollback: make an earlier revision the active one.
pub async fn activate_revision(
    State(state): State<AppState>,
    Path((product_id, revision_number)): Path<(Uuid, i64)>,
) -> Result<ResponseJson<ApiResponse<Revision>>, ApiError> {
    let revision = Revision::activate(&state.db.pool, product_id, revision_number).await?;
    tracing::info!(
        product_id = %product_id,
        revision_number = revision_number,
        "revision activated"
    );
    Ok(ResponseJson(ApiResponse::success(revision)))
}

/// DELETE /api/products/{product_id}/revisions/{revision_number}
pub async fn delete_revision(
    State(state): State<AppState>,
    Path((product_id, revision_number)): Path<(Uuid, i64)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Revision::soft_delete(&state.db.pool, product_id, revision_number).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products/{product_id}/revisions", get(list_revisions))
        .route(
            "/products/{product_id}/revisions/{revision_number}/activate",
            post(activate_revision),
        )
        .route(
            "/products/{product_id}/revisions/{revision_number}",
            delete(delete_revision),
        )
}
