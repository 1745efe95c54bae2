pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::bootstrap::AppState;

/// Build the orchestrator's HTTP router (§6 "HTTP surface of the
/// orchestrator"). No bearer-auth gate is specified for this surface in
/// the external-interfaces section — the catalog token presented in
/// `POST /sessions` is the credential that matters, not an inbound API
/// token — so unlike the teacher's gateway router this one carries no
/// `require_api_token` middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(sessions::create_session))
        .route("/version", get(version))
        .route("/ready", get(ready))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn version() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "serverVersion": env!("CARGO_PKG_VERSION"),
        "apiVersion": "v1",
    }))
}

async fn ready() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({ "status": "ready" }))
}
