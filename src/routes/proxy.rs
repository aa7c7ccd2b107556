//! `GET /api/proxy-head?url=...`
//!
//! Checks whether a file exists on an allowed IPFS gateway without the
//! browser hitting CORS limits. Disallowed hosts get 403 before any request
//! leaves the process. When the gateway can't answer, the response still
//! succeeds with `exists: false` and a content type guessed from the path.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{parse_query, respond, Reply};
use crate::server::AppState;
use crate::services::probe::{guess_content_type, parse_target, ProbeResult};
use crate::types::Result;

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyResponse {
    #[serde(flatten)]
    probe: ProbeResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    guessed_type: Option<&'static str>,
}

async fn do_proxy_head(state: &AppState, query: &str) -> Result<Reply<ProxyResponse>> {
    let query: ProxyQuery = parse_query(query)?;
    let target = parse_target(query.url.as_deref().unwrap_or_default())?;
    let guessed = guess_content_type(target.path());

    match state.probe.head(&target).await {
        Ok(probe) if probe.exists => Ok(Reply::new(ProxyResponse {
            probe,
            guessed_type: None,
        })),
        Ok(probe) => Ok(Reply::new(ProxyResponse {
            probe,
            guessed_type: Some(guessed),
        })),
        Err(e) => {
            debug!(url = %target, error = %e, "Gateway probe failed");
            Ok(Reply::with_message(
                e.to_string(),
                ProxyResponse {
                    probe: ProbeResult::default(),
                    guessed_type: Some(guessed),
                },
            ))
        }
    }
}

pub async fn proxy_head(state: Arc<AppState>, query: String) -> Response<Full<Bytes>> {
    respond(do_proxy_head(&state, &query).await)
}
