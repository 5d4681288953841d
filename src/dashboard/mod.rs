//! Dashboard — Axum control surface.
//!
//! Status, open scalp positions, pending approvals and the trading halt
//! switch. Approvals answered here complete the scalp engine's waits.
//! Read-only routes are open; the POST routes sit behind
//! [`routes::require_control_token`]. Binds to loopback by default.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// Bind the dashboard address and serve in a background task.
pub async fn spawn_dashboard(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind dashboard on {bind}:{port}"))?;

    info!(bind, port, "Dashboard server starting on http://{bind}:{port}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(routes::CONTROL_TOKEN_HEADER),
        ]);

    let control = Router::new()
        .route("/api/approvals/:id/approve", post(routes::approve))
        .route("/api/approvals/:id/reject", post(routes::reject))
        .route("/api/trading/halt", post(routes::halt))
        .route("/api/trading/resume", post(routes::resume))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_control_token,
        ));

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/positions", get(routes::get_positions))
        .route("/api/report", get(routes::get_report))
        .route("/api/approvals", get(routes::get_approvals))
        .route("/health", get(routes::health))
        .merge(control)
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
