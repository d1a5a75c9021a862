use axum::response::IntoResponse;

// Undocumented liveness route; load balancers hit this before /health.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}
