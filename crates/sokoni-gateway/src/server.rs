// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP server built on axum: webhook intake plus the admin order API.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use sokoni_core::SokoniError;
use sokoni_dialogue::DialogueEngine;
use sokoni_orders::OrderService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DialogueEngine>,
    pub orders: Arc<OrderService>,
    /// Token echoed back during webhook verification.
    pub verify_token: Option<String>,
    /// App secret for payload signature checks; `None` disables them.
    pub app_secret: Option<String>,
}

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(handlers::verify_webhook))
        .route("/webhook", post(handlers::receive_webhook))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/stats", get(handlers::order_stats))
        .route("/orders/{id}", get(handlers::get_order))
        .route("/orders/phone/{phone}", get(handlers::get_orders_by_phone))
        .route("/orders/{id}/status", put(handlers::update_order_status))
        .route("/orders/{id}/cancel", put(handlers::cancel_order))
        .route("/product-link/{item_id}", get(handlers::product_link))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), SokoniError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SokoniError::Internal(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| SokoniError::Internal(format!("server error: {e}")))?;

    Ok(())
}
