//! Configuration for bandstand
//!
//! CLI arguments and environment variable handling using clap.
//! A `.env` file in the working directory is loaded first (see `main.rs`).

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default data directory (agent key, registry snapshot, blobs)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bandstand")
}

/// bandstand - storage and delegation gateway for the band site
#[derive(Parser, Debug, Clone)]
#[command(name = "bandstand")]
#[command(about = "Upload, space and delegation endpoints backing the band website")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory for the agent key, registry snapshot and blobs
    #[arg(long, env = "DATA_DIR", default_value_os_t = default_data_dir())]
    pub data_dir: PathBuf,

    /// Write registry snapshots to disk (disable for throwaway instances)
    #[arg(long, env = "PERSIST", default_value = "true", action = clap::ArgAction::Set)]
    pub persist: bool,

    /// IPFS gateway used for returned URLs and verify fallback
    #[arg(long, env = "GATEWAY_URL", default_value = "https://w3s.link")]
    pub gateway_url: String,

    /// Timeout for gateway existence checks in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "5000")]
    pub probe_timeout_ms: u64,

    /// Delegation lifetime when the caller doesn't specify one
    #[arg(long, env = "DEFAULT_EXPIRATION_HOURS", default_value = "24")]
    pub default_expiration_hours: u32,

    /// Maximum multipart upload body in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "104857600")]
    pub max_upload_bytes: usize,

    /// Maximum JSON request body in bytes
    #[arg(long, env = "MAX_JSON_BYTES", default_value = "1048576")]
    pub max_json_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Gateway base URL without a trailing slash
    pub fn gateway_base(&self) -> &str {
        self.gateway_url.trim_end_matches('/')
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn agent_key_path(&self) -> PathBuf {
        self.data_dir.join("agent.key")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let gateway = url::Url::parse(&self.gateway_url)
            .map_err(|e| format!("GATEWAY_URL is not a valid URL: {}", e))?;
        if !matches!(gateway.scheme(), "http" | "https") {
            return Err("GATEWAY_URL must use http or https".to_string());
        }

        if self.probe_timeout_ms == 0 {
            return Err("PROBE_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.default_expiration_hours == 0 {
            return Err("DEFAULT_EXPIRATION_HOURS must be greater than zero".to_string());
        }

        if self.max_upload_bytes < self.max_json_bytes {
            return Err("MAX_UPLOAD_BYTES must be at least MAX_JSON_BYTES".to_string());
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be text or json, got {}", self.log_format));
        }

        Ok(())
    }
}
