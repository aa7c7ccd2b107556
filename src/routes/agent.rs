//! Agent identity endpoints
//!
//! - `GET /api/agent` and `GET /api/delegation/get-agent-did`
//! - `GET /api/initialize`

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use std::sync::Arc;

use super::{respond, Reply};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentResponse {
    agent_did: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResponse {
    agent_did: String,
    is_logged_in: bool,
    space_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_space: Option<String>,
}

pub async fn agent_did(state: Arc<AppState>) -> Response<Full<Bytes>> {
    respond(Ok(Reply::new(AgentResponse {
        agent_did: state.provider.agent_did().to_string(),
    })))
}

pub async fn initialize(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let provider = &state.provider;
    let response = InitializeResponse {
        agent_did: provider.agent_did().to_string(),
        is_logged_in: provider.is_logged_in().await,
        space_count: provider.agent_spaces().await.len(),
        current_space: provider.current_space().await.map(|did| did.to_string()),
    };
    respond(Ok(Reply::with_message("Client initialized", response)))
}
