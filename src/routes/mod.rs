//! HTTP route handlers
//!
//! Every endpoint answers with the same JSON envelope:
//!
//! ```text
//! { "success": bool, "message"?: string, ...payload }
//! ```
//!
//! Handlers return `Result<T>`; `respond` turns the error side into a
//! `{success: false, message}` body with the error's status code.

pub mod agent;
pub mod delegation;
pub mod health;
pub mod login;
pub mod proxy;
pub mod spaces;
pub mod upload;
pub mod verify;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::types::{GatewayError, Result};

pub use agent::{agent_did, initialize};
pub use delegation::{create_delegation, list_delegations, revoke_delegation, use_delegation};
pub use health::{health_check, version_info};
pub use login::{login, login_status};
pub use proxy::proxy_head;
pub use spaces::{create_space, list_spaces, switch_space, verify_space};
pub use upload::upload;
pub use verify::verify;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

/// Successful payload plus an optional human message
pub struct Reply<T> {
    pub message: Option<String>,
    pub payload: T,
}

impl<T> Reply<T> {
    pub fn new(payload: T) -> Self {
        Self {
            message: None,
            payload,
        }
    }

    pub fn with_message(message: impl Into<String>, payload: T) -> Self {
        Self {
            message: Some(message.into()),
            payload,
        }
    }
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(json)))
            .unwrap(),
        Err(_) => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from("Failed to serialize response")))
            .unwrap(),
    }
}

pub fn error_response(err: &GatewayError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %err, "Request failed");
    }
    json_response(
        status,
        &Envelope {
            success: false,
            message: Some(err.to_string()),
            payload: serde_json::Map::new(),
        },
    )
}

/// Render a handler result as the standard envelope
pub fn respond<T: Serialize>(result: Result<Reply<T>>) -> Response<Full<Bytes>> {
    match result {
        Ok(reply) => json_response(
            StatusCode::OK,
            &Envelope {
                success: true,
                message: reply.message,
                payload: reply.payload,
            },
        ),
        Err(err) => error_response(&err),
    }
}

/// Parse a JSON request body
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.is_empty() {
        return Err(GatewayError::Validation("Request body must be JSON".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Parse URL query parameters
pub fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T> {
    serde_urlencoded::from_str(query)
        .map_err(|e| GatewayError::Validation(format!("Invalid query string: {}", e)))
}

/// A required, non-blank string field
pub fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("{} is required", field)))
}
