//! Account login
//!
//! - `POST /api/login` - `{email}`; idempotent
//! - `GET /api/login-status`

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{parse_json, respond, Reply};
use crate::server::AppState;
use crate::session::validate_email;
use crate::types::Result;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginStatusResponse {
    is_logged_in: bool,
}

async fn do_login(state: &AppState, body: &Bytes) -> Result<Reply<LoginResponse>> {
    let request: LoginRequest = parse_json(body)?;
    let email = validate_email(request.email.as_deref().unwrap_or_default())?;

    let existing = state.provider.has_session(email).await;
    state.provider.login(email).await?;
    info!(email = %email, existing, "Login");

    let message = if existing {
        "Already logged in"
    } else {
        "Login successful"
    };
    Ok(Reply::with_message(
        message,
        LoginResponse {
            email: email.to_string(),
        },
    ))
}

pub async fn login(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_login(&state, &body).await)
}

pub async fn login_status(state: Arc<AppState>) -> Response<Full<Bytes>> {
    respond(Ok(Reply::new(LoginStatusResponse {
        is_logged_in: state.provider.is_logged_in().await,
    })))
}
