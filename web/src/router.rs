use crate::{controller::health_check_controller, sse::handler::sse_handler, AppState};
use axum::{routing::get, Router};
use std::path::Path;
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

pub fn define_routes(app_state: AppState) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    Router::new()
        .merge(health_routes())
        .merge(sse_routes(app_state))
        .fallback_service(static_routes(&static_dir))
        .layer(TraceLayer::new_for_http())
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

/// The event stream. Kept out of the compression layer so every frame reaches
/// the client as soon as it is written.
fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(sse_handler))
        .with_state(app_state)
}

// Front-end assets that consume the event stream
pub fn static_routes(static_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(static_dir))
        .layer(CompressionLayer::new())
}
