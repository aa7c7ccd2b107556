//! `POST /api/verify` - `{cid, filename?, spaceDid?}`

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Deserialize;
use std::sync::Arc;

use super::{parse_json, required, respond, Reply};
use crate::server::AppState;
use crate::services::{self, Verification};
use crate::types::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    cid: Option<String>,
    filename: Option<String>,
    space_did: Option<String>,
}

async fn do_verify(state: &AppState, body: &Bytes) -> Result<Reply<Verification>> {
    let request: VerifyRequest = parse_json(body)?;
    let cid = required(request.cid.as_deref(), "cid")?;

    let verification = services::verify(
        &state.provider,
        &state.probe,
        state.args.gateway_base(),
        cid,
        request.filename.as_deref(),
        request.space_did.as_deref(),
    )
    .await?;

    let message = if verification.verified {
        "Content verified"
    } else {
        "Content not found"
    };
    Ok(Reply::with_message(message, verification))
}

pub async fn verify(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_verify(&state, &body).await)
}
