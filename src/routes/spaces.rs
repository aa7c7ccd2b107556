//! Space management endpoints
//!
//! - `POST /api/create-space` - `{email, spaceName}`
//! - `POST /api/list-spaces` - `{email, cursor?, size?}`
//! - `POST /api/switch-space` - `{spaceDid, email}`
//! - `POST /api/verify-space` - `{spaceDid, email}`

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{parse_json, required, respond, Reply};
use crate::capability::SpaceInfo;
use crate::server::AppState;
use crate::session::Session;
use crate::types::{GatewayError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaceRequest {
    email: Option<String>,
    space_did: Option<String>,
    space_name: Option<String>,
    cursor: Option<String>,
    size: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpaceResponse {
    space_did: String,
    space_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    provisioned: bool,
}

impl SpaceResponse {
    fn from_info(space: SpaceInfo, email: Option<String>) -> Self {
        Self {
            space_did: space.did.to_string(),
            space_name: space.name,
            email,
            provisioned: space.provisioned,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpaceEntry {
    did: String,
    name: String,
}

#[derive(Serialize)]
struct SpaceListResponse {
    spaces: Vec<SpaceEntry>,
    /// DID to pass back as `cursor` for the next page; null on the last page
    cursor: Option<String>,
}

/// Slice `spaces` after `cursor` (a DID from the previous page)
fn paginate(
    spaces: Vec<SpaceInfo>,
    cursor: Option<&str>,
    size: Option<usize>,
) -> Result<(Vec<SpaceInfo>, Option<String>)> {
    let start = match cursor.map(str::trim).filter(|c| !c.is_empty()) {
        Some(cursor) => {
            spaces
                .iter()
                .position(|s| s.did.as_str() == cursor)
                .ok_or_else(|| GatewayError::Validation(format!("Unknown cursor: {}", cursor)))?
                + 1
        }
        None => 0,
    };

    let size = match size {
        Some(0) => return Err(GatewayError::Validation("size must be at least 1".to_string())),
        Some(size) => size,
        None => usize::MAX,
    };

    let remaining = spaces.len().saturating_sub(start);
    let page: Vec<SpaceInfo> = spaces.into_iter().skip(start).take(size).collect();
    let next = if remaining > page.len() {
        page.last().map(|s| s.did.to_string())
    } else {
        None
    };
    Ok((page, next))
}

async fn do_create_space(state: &AppState, body: &Bytes) -> Result<Reply<SpaceResponse>> {
    let request: SpaceRequest = parse_json(body)?;
    let email = required(request.email.as_deref(), "email")?;
    let name = required(request.space_name.as_deref(), "spaceName")?;

    let session = Session::open(state.provider.clone(), email).await?;
    let mut space = state.provider.create_space(session.email(), name).await?;

    // Space exists even when provisioning fails
    match state.provider.provision_space(session.email(), &space.did).await {
        Ok(()) => space.provisioned = true,
        Err(e) => warn!(space = %space.did, error = %e, "Failed to provision space"),
    }
    state.provider.set_current_space(&space.did).await?;

    info!(space = %space.did, email = %session.email(), "Space created");
    Ok(Reply::with_message(
        "Space created",
        SpaceResponse::from_info(space, Some(session.email().to_string())),
    ))
}

async fn do_list_spaces(state: &AppState, body: &Bytes) -> Result<Reply<SpaceListResponse>> {
    let request: SpaceRequest = parse_json(body)?;
    let email = required(request.email.as_deref(), "email")?;

    let session = Session::open(state.provider.clone(), email).await?;
    let (page, cursor) = paginate(session.spaces().await?, request.cursor.as_deref(), request.size)?;

    Ok(Reply::new(SpaceListResponse {
        spaces: page
            .into_iter()
            .map(|s| SpaceEntry {
                did: s.did.to_string(),
                name: s.name,
            })
            .collect(),
        cursor,
    }))
}

async fn do_switch_space(state: &AppState, body: &Bytes) -> Result<Reply<SpaceResponse>> {
    let request: SpaceRequest = parse_json(body)?;
    let space_did = required(request.space_did.as_deref(), "spaceDid")?;
    let email = required(request.email.as_deref(), "email")?;

    let session = Session::open(state.provider.clone(), email).await?;
    let space = session.use_space(space_did).await?;

    info!(space = %space.did, "Switched space");
    Ok(Reply::with_message(
        "Space switched",
        SpaceResponse::from_info(space, None),
    ))
}

async fn do_verify_space(state: &AppState, body: &Bytes) -> Result<Reply<SpaceResponse>> {
    let request: SpaceRequest = parse_json(body)?;
    let space_did = required(request.space_did.as_deref(), "spaceDid")?;
    let email = required(request.email.as_deref(), "email")?;

    let session = Session::open(state.provider.clone(), email).await?;
    let space = session.find_space(space_did).await?;

    Ok(Reply::with_message(
        "Space verified",
        SpaceResponse::from_info(space, None),
    ))
}

pub async fn create_space(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_create_space(&state, &body).await)
}

pub async fn list_spaces(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_list_spaces(&state, &body).await)
}

pub async fn switch_space(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_switch_space(&state, &body).await)
}

pub async fn verify_space(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_verify_space(&state, &body).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::Agent;

    fn spaces(n: usize) -> Vec<SpaceInfo> {
        (0..n)
            .map(|i| SpaceInfo {
                did: Agent::generate().did().clone(),
                name: format!("space-{}", i),
                owner: None,
                provisioned: false,
            })
            .collect()
    }

    #[test]
    fn test_paginate_walks_all_pages() {
        let all = spaces(5);

        let (first, cursor) = paginate(all.clone(), None, Some(2)).unwrap();
        assert_eq!(first, all[0..2]);
        let cursor = cursor.unwrap();

        let (second, cursor) = paginate(all.clone(), Some(&cursor), Some(2)).unwrap();
        assert_eq!(second, all[2..4]);

        let (last, cursor) = paginate(all.clone(), cursor.as_deref(), Some(2)).unwrap();
        assert_eq!(last, all[4..]);
        assert!(cursor.is_none());
    }

    #[test]
    fn test_paginate_defaults_and_errors() {
        let all = spaces(3);
        let (page, cursor) = paginate(all.clone(), None, None).unwrap();
        assert_eq!(page, all);
        assert!(cursor.is_none());

        assert!(paginate(all.clone(), None, Some(0)).is_err());
        assert!(paginate(all, Some("did:key:zUnknown"), None).is_err());
    }
}
