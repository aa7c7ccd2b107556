//! Delegation endpoints
//!
//! - `POST /api/delegation/create` - issue a delegation, archive as base64
//! - `GET  /api/delegation/list?email=&spaceDid=` - always empty
//! - `POST /api/delegation/revoke` - switch to a fresh replacement space
//! - `POST /api/delegation/use` - install a base64 archive
//!
//! Revocation can't reach delegations that have already been handed out:
//! they stay valid until they expire. "Revoke" therefore creates a new space
//! and makes it current, leaving the old space untouched.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{parse_json, parse_query, required, respond, Reply};
use crate::server::AppState;
use crate::services::consumer::decode_archive;
use crate::services::{apply_delegation, issue_delegation, DelegationRequest};
use crate::session::Session;
use crate::types::Result;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    /// Archive bytes, standard base64
    delegation: String,
    delegation_id: String,
    expiration: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaceQuery {
    email: Option<String>,
    space_did: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    delegations: Vec<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RevokeResponse {
    old_space_did: String,
    new_space_did: String,
    new_space_name: String,
}

#[derive(Debug, Deserialize)]
struct UseRequest {
    delegation: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UseResponse {
    space_did: String,
    space_name: String,
}

async fn do_create(state: &AppState, body: &Bytes) -> Result<Reply<CreateResponse>> {
    let request: DelegationRequest = parse_json(body)?;
    let issued = issue_delegation(
        state.provider.clone(),
        &request,
        state.args.default_expiration_hours,
    )
    .await?;

    Ok(Reply::with_message(
        "Delegation created",
        CreateResponse {
            delegation: STANDARD.encode(&issued.archive),
            delegation_id: issued.id.to_string(),
            expiration: issued.expiration,
        },
    ))
}

async fn do_list(state: &AppState, query: &str) -> Result<Reply<ListResponse>> {
    let query: SpaceQuery = parse_query(query)?;
    let email = required(query.email.as_deref(), "email")?;
    let space_did = required(query.space_did.as_deref(), "spaceDid")?;

    let session = Session::open(state.provider.clone(), email).await?;
    session.find_space(space_did).await?;

    Ok(Reply::with_message(
        "Listing issued delegations is not supported by the storage network",
        ListResponse {
            delegations: Vec::new(),
        },
    ))
}

async fn do_revoke(state: &AppState, body: &Bytes) -> Result<Reply<RevokeResponse>> {
    let request: SpaceQuery = parse_json(body)?;
    let space_did = required(request.space_did.as_deref(), "spaceDid")?;
    let email = required(request.email.as_deref(), "email")?;

    let session = Session::open(state.provider.clone(), email).await?;
    let old = session.find_space(space_did).await?;

    let name = format!("{} (replacement)", old.name);
    let new = state.provider.create_space(session.email(), &name).await?;
    if let Err(e) = state.provider.provision_space(session.email(), &new.did).await {
        warn!(space = %new.did, error = %e, "Failed to provision replacement space");
    }
    state.provider.set_current_space(&new.did).await?;

    info!(old = %old.did, new = %new.did, "Replaced space to revoke delegations");

    Ok(Reply::with_message(
        "Created a replacement space. Existing delegations on the old space remain valid until they expire.",
        RevokeResponse {
            old_space_did: old.did.to_string(),
            new_space_did: new.did.to_string(),
            new_space_name: new.name,
        },
    ))
}

async fn do_use(state: &AppState, body: &Bytes) -> Result<Reply<UseResponse>> {
    let request: UseRequest = parse_json(body)?;
    let archive = decode_archive(request.delegation.as_deref().unwrap_or_default())?;
    let applied = apply_delegation(&state.provider, &archive).await?;

    Ok(Reply::with_message(
        "Delegation applied",
        UseResponse {
            space_did: applied.space_did.to_string(),
            space_name: applied.space_name,
        },
    ))
}

pub async fn create_delegation(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_create(&state, &body).await)
}

pub async fn list_delegations(state: Arc<AppState>, query: String) -> Response<Full<Bytes>> {
    respond(do_list(&state, &query).await)
}

pub async fn revoke_delegation(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_revoke(&state, &body).await)
}

pub async fn use_delegation(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_use(&state, &body).await)
}
