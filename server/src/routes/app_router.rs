use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::ServerState;

use super::{export_collection, inbound_webhook, kickstart_db, reprocess_emails};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/", get(|| async { "Mailbase server" }))
            .route("/api/inbound-webhook", post(inbound_webhook::handler))
            .route("/api/reprocess-emails", post(reprocess_emails::handler))
            .route("/api/kickstart-db", post(kickstart_db::handler))
            .route("/api/export-collection", post(export_collection::handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
