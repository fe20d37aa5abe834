mod gemini;
mod models;
mod pdf;
mod routes;
mod stages;
mod tools;
mod workflow;

use axum::{Router, routing::{post, get}};
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, Any};
use tracing_subscriber::{fmt, EnvFilter};

use crate::gemini::GeminiClient;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| "DEMO_KEY".into());
    if api_key == "DEMO_KEY" {
        tracing::warn!("GEMINI_API_KEY not set, running in demo mode with placeholder generation");
    }
    let state = AppState::new(Arc::new(GeminiClient::new(api_key)));

    let app = Router::new()
        .route("/api/planning", post(routes::create_session))
        .route("/api/planning/:id", get(routes::get_session))
        .route("/api/planning/:id/civil/revise", post(routes::revise_civil))
        .route("/api/planning/:id/civil/approve", post(routes::approve_civil))
        .route("/api/planning/:id/architectural/revise", post(routes::revise_architectural))
        .route("/api/planning/:id/architectural/approve", post(routes::approve_architectural))
        .route("/api/planning/:id/interior/revise", post(routes::revise_interior))
        .route("/api/planning/:id/interior/approve", post(routes::approve_interior))
        .route("/api/planning/:id/back", post(routes::go_back))
        .route("/api/planning/:id/pdf", get(routes::export_pdf))
        .route("/api/estimate", post(routes::estimate_materials))
        .route("/api/improve", post(routes::improve_plan))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app).await.unwrap();
}
