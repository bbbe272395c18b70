//! Admission gate for bid submission routes.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, warn};

use super::auth::{role_from_headers, user_id_from_headers, Role};
use super::AppState;
use crate::admission::Decision;

/// Count contractor bid submissions against the admission controller.
///
/// Only `POST` requests from contractors are counted; everything else passes
/// through untouched. Requests without a usable identity are rejected as
/// unauthenticated before the controller is consulted.
pub async fn admission_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let role = match role_from_headers(request.headers()) {
        Ok(role) => role,
        Err(rejection) => return rejection.into_response(),
    };

    if role != Role::Contractor {
        return next.run(request).await;
    }

    let user_id = match user_id_from_headers(request.headers()) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    match state.admission.admit(&user_id) {
        Decision::Allowed => next.run(request).await,
        Decision::Rejected { retry_after } => {
            warn!(identity = %user_id, retry_after = %retry_after, "Bid submission rate limited");

            let wait_secs = (retry_after - state.admission.now()).num_seconds().max(0);
            debug!(identity = %user_id, wait_secs, "Rejecting until window resets");

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded. Please try again later.",
                    "retry_after": retry_after.timestamp(),
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(wait_secs));
            response
        }
    }
}
