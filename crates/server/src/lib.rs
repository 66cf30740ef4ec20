pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use db::DBService;
use services::services::{
    chat::ChatService, tech_pack::TechPackService, workflow::GenerationWorkflow,
};
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub workflow: Arc<GenerationWorkflow>,
    pub chat: Arc<ChatService>,
    pub tech_pack: Arc<TechPackService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
