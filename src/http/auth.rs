//! Caller identity supplied by the upstream token verifier.
//!
//! Tokens are verified before requests reach this service; the verifier
//! forwards the caller's user id and role as trusted headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Marketplace role of a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Posts tenders and awards bids
    Client,
    /// Submits bids on tenders
    Contractor,
    /// Any role this service has no special handling for
    Other(String),
}

impl Role {
    fn parse(value: &str) -> Self {
        match value {
            "client" => Role::Client,
            "contractor" => Role::Contractor,
            other => Role::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Contractor => write!(f, "contractor"),
            Role::Other(role) => write!(f, "{}", role),
        }
    }
}

/// Why a request could not be attributed to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("Missing token")]
    MissingCredential,
    #[error("Authentication required")]
    AuthenticationRequired,
    #[error("role not found in token")]
    MissingRole,
    #[error("user_id not found in token")]
    MissingUserId,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = match self {
            AuthRejection::MissingCredential | AuthRejection::AuthenticationRequired => {
                json!({ "message": self.to_string() })
            }
            AuthRejection::MissingRole | AuthRejection::MissingUserId => {
                json!({ "error": self.to_string() })
            }
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Role of the caller.
pub fn role_from_headers(headers: &HeaderMap) -> Result<Role, AuthRejection> {
    let role = header(headers, USER_ROLE_HEADER);
    let user_id = header(headers, USER_ID_HEADER);

    match (role, user_id) {
        (None, None) => Err(AuthRejection::MissingCredential),
        (Some(role), _) if !role.is_empty() => Ok(Role::parse(role)),
        _ => Err(AuthRejection::MissingRole),
    }
}

/// User id of the caller.
pub fn user_id_from_headers(headers: &HeaderMap) -> Result<String, AuthRejection> {
    match header(headers, USER_ID_HEADER) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(AuthRejection::MissingUserId),
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    /// Extract the caller from trusted headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthRejection> {
        let role = role_from_headers(headers)?;
        let user_id = user_id_from_headers(headers)?;
        Ok(Self { user_id, role })
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

/// A caller identified by user id alone, as notification subscribers are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub user_id: String,
}

impl Subscriber {
    /// Extract the subscriber from trusted headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthRejection> {
        let user_id = user_id_from_headers(headers)
            .map_err(|_| AuthRejection::AuthenticationRequired)?;
        Ok(Self { user_id })
    }
}

impl<S> FromRequestParts<S> for Subscriber
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Subscriber::from_headers(&parts.headers)
    }
}
