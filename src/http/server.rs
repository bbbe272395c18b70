//! HTTP server implementation.

use axum::extract::State;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::{bids, gate, ws};
use crate::admission::AdmissionController;
use crate::config::BidgateConfig;
use crate::error::{BidgateError, Result};
use crate::notify::ConnectionRegistry;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Bid submission admission controller
    pub admission: Arc<AdmissionController>,
    /// Live notification connections
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Bundle existing components.
    pub fn new(admission: Arc<AdmissionController>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            admission,
            registry,
        }
    }

    /// Build fresh components from configuration.
    pub fn from_config(config: &BidgateConfig) -> Self {
        Self::new(
            Arc::new(AdmissionController::new(config.admission.policy())),
            Arc::new(ConnectionRegistry::with_policies(
                config.notify.supersede,
                config.notify.on_write_failure,
            )),
        )
    }
}

/// Build the service's routes.
pub fn router(state: AppState) -> Router {
    let submissions = Router::new()
        .route(
            "/contractor/tenders/{tender_id}/bid",
            post(bids::submit_bid),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::admission_gate,
        ));

    let api = Router::new()
        .merge(submissions)
        .route(
            "/client/tenders/{tender_id}/award/{bid_id}",
            post(bids::award_bid),
        );

    Router::new()
        .nest("/api", api)
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connections": state.registry.len(),
        "admission_windows": state.admission.window_count(),
    }))
}

/// HTTP server for the bid gateway.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    /// Create a new server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Bind and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            BidgateError::Io(e)
        })?;
        Self::serve_listener(listener, self.state, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(listener: TcpListener, state: AppState, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Starting HTTP server with graceful shutdown");

        axum::serve(listener, router(state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                BidgateError::Io(e)
            })
    }
}
