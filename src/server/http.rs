//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. Bodies are collected
//! up front under a size limit (the upload limit for `/api/upload`, the JSON
//! limit everywhere else) and handed to [`dispatch`] as `Request<Bytes>`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::capability::CapabilityProvider;
use crate::config::Args;
use crate::routes;
use crate::services::GatewayProbe;
use crate::types::{GatewayError, Result};

const UPLOAD_PATH: &str = "/api/upload";

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Capability provider chosen at startup
    pub provider: Arc<dyn CapabilityProvider>,
    /// HEAD prober for proxy-head and verify
    pub probe: GatewayProbe,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, provider: Arc<dyn CapabilityProvider>) -> Result<Self> {
        let probe = GatewayProbe::new(args.probe_timeout())?;
        Ok(Self {
            args,
            provider,
            probe,
            started_at: Instant::now(),
        })
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "bandstand listening on {} as agent {}",
        state.args.listen,
        state.provider.agent_did()
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    info!("[{}] {} {}", addr, req.method(), req.uri().path());

    let limit = if req.uri().path() == UPLOAD_PATH {
        state.args.max_upload_bytes
    } else {
        state.args.max_json_bytes
    };

    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Ok(routes::error_response(&GatewayError::PayloadTooLarge(limit)));
        }
        Err(e) => {
            return Ok(routes::error_response(&GatewayError::Validation(format!(
                "Failed to read request body: {}",
                e
            ))));
        }
    };

    Ok(dispatch(state, Request::from_parts(parts, body)).await)
}

/// Method each API path answers to
fn allowed_method(path: &str) -> Option<Method> {
    match path {
        "/health" | "/healthz" | "/version" => Some(Method::GET),
        "/api/agent"
        | "/api/delegation/get-agent-did"
        | "/api/delegation/list"
        | "/api/initialize"
        | "/api/login-status"
        | "/api/proxy-head" => Some(Method::GET),
        "/api/create-space"
        | "/api/delegation/create"
        | "/api/delegation/revoke"
        | "/api/delegation/use"
        | "/api/list-spaces"
        | "/api/login"
        | "/api/switch-space"
        | "/api/upload"
        | "/api/verify-space"
        | "/api/verify" => Some(Method::POST),
        _ => None,
    }
}

/// Route a request with a fully collected body
pub async fn dispatch(state: Arc<AppState>, req: Request<Bytes>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or_default().to_string();

    if parts.method == Method::OPTIONS {
        return preflight_response();
    }

    let Some(allowed) = allowed_method(&path) else {
        return not_found_response(&path);
    };
    if parts.method != allowed {
        let mut response =
            routes::error_response(&GatewayError::MethodNotAllowed(parts.method.to_string()));
        if let Ok(value) = allowed.as_str().parse() {
            response.headers_mut().insert(ALLOW, value);
        }
        return response;
    }

    match path.as_str() {
        "/health" | "/healthz" => routes::health_check(state).await,
        "/version" => routes::version_info(),

        "/api/agent" | "/api/delegation/get-agent-did" => routes::agent_did(state).await,
        "/api/initialize" => routes::initialize(state).await,
        "/api/login" => routes::login(state, body).await,
        "/api/login-status" => routes::login_status(state).await,

        "/api/create-space" => routes::create_space(state, body).await,
        "/api/list-spaces" => routes::list_spaces(state, body).await,
        "/api/switch-space" => routes::switch_space(state, body).await,
        "/api/verify-space" => routes::verify_space(state, body).await,

        "/api/delegation/create" => routes::create_delegation(state, body).await,
        "/api/delegation/list" => routes::list_delegations(state, query).await,
        "/api/delegation/revoke" => routes::revoke_delegation(state, body).await,
        "/api/delegation/use" => routes::use_delegation(state, body).await,

        "/api/upload" => {
            let content_type = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            routes::upload(state, content_type, body).await
        }
        "/api/proxy-head" => routes::proxy_head(state, query).await,
        "/api/verify" => routes::verify(state, body).await,

        _ => not_found_response(&path),
    }
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_response(&GatewayError::NotFound(format!("Route {} not found", path)))
}
