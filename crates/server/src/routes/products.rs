use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::product::{CreateProduct, Product};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// POST /api/products
pub async fn create_product(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateProduct>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    let product = Product::create(&state.db.pool, &payload, Uuid::new_v4()).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok(ResponseJson(ApiResponse::success(product)))
}

/// GET /api/products
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Product>>>, ApiError> {
    let products = Product::find_all(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(products)))
}

/// GET /api/products/{product_id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Product>>, ApiError> {
    let product = Product::find_by_id(&state.db.pool, product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("product not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(product)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/{product_id}", get(get_product))
}
