use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET the liveness of the relay's HTTP router
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
