//! Gateway existence probing
//!
//! Only a fixed set of IPFS gateways (and their subdomains) may be probed.
//! The host check happens before any outbound request, and redirects are
//! followed only while they stay on allowed hosts.

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::types::{GatewayError, Result};

/// Gateways that may be probed
pub const ALLOWED_GATEWAYS: [&str; 6] = [
    "w3s.link",
    "ipfs.io",
    "ipfs.tech",
    "nftstorage.link",
    "dweb.link",
    "cf-ipfs.com",
];

const MAX_REDIRECTS: usize = 5;

/// Exact match or subdomain of an allowed gateway
pub fn is_allowed_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    ALLOWED_GATEWAYS.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Parse a probe target and enforce the allow-list
pub fn parse_target(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GatewayError::Validation("url is required".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| GatewayError::Validation(format!("Invalid url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GatewayError::Validation(format!(
            "Unsupported url scheme: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::Validation("url has no host".to_string()))?;
    if !is_allowed_host(host) {
        return Err(GatewayError::Forbidden(format!(
            "Host {} is not an allowed gateway",
            host
        )));
    }

    Ok(url)
}

/// Best guess at a MIME type from the path's extension
pub fn guess_content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Outcome of a HEAD request against a gateway
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub exists: bool,
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

/// HEAD prober raced against a fixed timeout
pub struct GatewayProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl GatewayProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let policy = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if attempt.url().host_str().is_some_and(is_allowed_host) {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let client = reqwest::Client::builder()
            .redirect(policy)
            .user_agent(concat!("bandstand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// HEAD `url`. Errors when the request fails or outlives the timeout.
    pub async fn head(&self, url: &Url) -> Result<ProbeResult> {
        let response = tokio::time::timeout(self.timeout, self.client.head(url.clone()).send())
            .await
            .map_err(|_| {
                GatewayError::Upstream(format!(
                    "Gateway did not answer within {} ms",
                    self.timeout.as_millis()
                ))
            })??;

        let status = response.status();
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        debug!(url = %url, status = status.as_u16(), "Gateway probe");

        Ok(ProbeResult {
            exists: status.is_success(),
            status: Some(status.as_u16()),
            content_type,
            content_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        assert!(is_allowed_host("w3s.link"));
        assert!(is_allowed_host("IPFS.IO"));
        assert!(is_allowed_host("bafybeigdyrzt.ipfs.dweb.link"));
        assert!(!is_allowed_host("evil-w3s.link"));
        assert!(!is_allowed_host("w3s.link.evil.example"));
        assert!(!is_allowed_host("example.com"));
    }

    #[test]
    fn test_parse_target() {
        assert!(parse_target("https://w3s.link/ipfs/bafy/song.mp3").is_ok());
        assert!(matches!(
            parse_target("https://example.com/ipfs/bafy"),
            Err(GatewayError::Forbidden(_))
        ));
        assert!(matches!(
            parse_target("https://example.com/"),
            Err(GatewayError::Forbidden(_))
        ));
        assert!(matches!(parse_target(""), Err(GatewayError::Validation(_))));
        assert!(matches!(
            parse_target("not a url"),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            parse_target("ftp://ipfs.io/x"),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("/ipfs/bafy/Cover.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("/ipfs/bafy/track.flac"), "audio/flac");
        assert_eq!(guess_content_type("/ipfs/bafy"), "application/octet-stream");
        assert_eq!(guess_content_type("/ipfs/v1.2/readme"), "application/octet-stream");
    }
}
