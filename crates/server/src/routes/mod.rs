pub mod chat;
pub mod generation;
pub mod health;
pub mod products;
pub mod revisions;
pub mod tech_pack;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(products::router())
        .merge(chat::router())
        .merge(generation::router())
        .merge(revisions::router())
        .merge(tech_pack::router())
}
