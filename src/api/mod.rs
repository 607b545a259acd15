//! # API Module
//!
//! HTTP surface of the server. Everything the MCP stdio mode offers is
//! reachable over `POST /api/rpc`.
//!
//! ## Available Endpoints
//!
//! - `GET /api/health` - Liveness plus the connected chain and signer
//! - `POST /api/rpc` - JSON-RPC requests forwarded to the MCP dispatcher

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod health;
pub mod rpc;

/// Builds the application router with all routes nested under `/api`.
pub fn create_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/rpc", post(rpc::rpc_handler));

    Router::new()
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
