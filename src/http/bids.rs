//! Bid submission and award endpoints.
//!
//! Storing tenders and bids belongs to the marketplace's persistence layer;
//! these handlers are the point where a completed bid workflow step turns
//! into a live notification for the other party.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::auth::Caller;
use super::AppState;
use crate::notify::DomainEvent;

/// Errors returned to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// A contractor's bid on a tender.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBid {
    /// Owner of the tender, who is notified of the bid
    pub client_id: String,
    pub price: f64,
    /// Delivery time in days
    #[serde(default)]
    pub delivery_time: u32,
    #[serde(default)]
    pub comments: String,
}

/// Accepted bid returned to the contractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidAccepted {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub contractor_id: String,
    pub price: f64,
    pub delivery_time: u32,
    pub comments: String,
    pub status: String,
}

/// Award details sent by the tender owner.
#[derive(Debug, Clone, Deserialize)]
pub struct AwardBid {
    /// Contractor who placed the winning bid
    pub contractor_id: String,
    #[serde(default)]
    pub price: f64,
}

/// `POST /api/contractor/tenders/{tender_id}/bid`
#[instrument(skip_all, fields(contractor = %caller.user_id, tender = %tender_id))]
pub async fn submit_bid(
    State(state): State<AppState>,
    caller: Caller,
    Path(tender_id): Path<Uuid>,
    Json(body): Json<SubmitBid>,
) -> Result<(StatusCode, Json<BidAccepted>), ApiError> {
    if !body.price.is_finite() || body.price <= 0.0 {
        return Err(ApiError::BadRequest("price must be greater than 0".to_string()));
    }
    if body.client_id.trim().is_empty() {
        return Err(ApiError::BadRequest("client_id is required".to_string()));
    }

    let bid = BidAccepted {
        id: Uuid::new_v4(),
        tender_id,
        contractor_id: caller.user_id,
        price: body.price,
        delivery_time: body.delivery_time,
        comments: body.comments,
        status: "pending".to_string(),
    };
    info!(bid = %bid.id, price = bid.price, "Bid submitted");

    let event = DomainEvent::new_bid(body.client_id, tender_id, bid.id, bid.price);
    // The bid stands even if the tender owner cannot be told about it
    if let Err(e) = state.registry.publish(&event).await {
        warn!(bid = %bid.id, recipient = %event.recipient(), error = %e, "New bid notification failed");
    }

    Ok((StatusCode::CREATED, Json(bid)))
}

/// `POST /api/client/tenders/{tender_id}/award/{bid_id}`
#[instrument(skip_all, fields(client = %caller.user_id, tender = %tender_id, bid = %bid_id))]
pub async fn award_bid(
    State(state): State<AppState>,
    caller: Caller,
    Path((tender_id, bid_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AwardBid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.contractor_id.trim().is_empty() {
        return Err(ApiError::BadRequest("contractor_id is required".to_string()));
    }

    info!("Bid awarded");

    let event = DomainEvent::award(body.contractor_id, tender_id, Some(bid_id), body.price);
    if let Err(e) = state.registry.publish(&event).await {
        warn!(recipient = %event.recipient(), error = %e, "Award notification failed");
    }

    Ok(Json(json!({ "message": "Bid awarded successfully" })))
}
