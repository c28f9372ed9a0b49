use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

mod health;
mod metadata;
mod predict;
mod web;

pub use health::health;
pub use metadata::metadata;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(web::root))
        .route("/web", get(web::form))
        .route("/health", get(health))
        .route("/metadata", get(metadata))
        .route("/predict", post(predict::routes::predict))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
