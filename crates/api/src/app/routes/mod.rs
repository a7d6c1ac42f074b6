use axum::{
    Router,
    routing::{delete, get, patch, post},
};

pub mod goods;
pub mod system;

/// Router for everything under `/api/v1`.
pub fn router() -> Router {
    Router::new()
        .route("/goods/list", get(goods::list_goods))
        .route("/goods", get(goods::get_good))
        .route("/good/create", post(goods::create_good))
        .route("/good/update", patch(goods::update_good))
        .route("/good/remove", delete(goods::remove_good))
        .route("/good/reprioritize", patch(goods::reprioritize_good))
}
