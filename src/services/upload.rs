//! Upload pipeline
//!
//! Files plus a generated `metadata.json` companion go to the provider as
//! one directory upload. The caller gets back the root CID and a gateway URL
//! pointing at the primary (first) file.

use chrono::{DateTime, SecondsFormat, Utc};
use cid::Cid;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::capability::{CapabilityProvider, UploadFile};
use crate::session::Session;
use crate::types::{GatewayError, Result};

/// Name of the generated companion file
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub email: String,
    pub space_did: Option<String>,
    pub space_name: Option<String>,
    pub files: Vec<UploadFile>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub cid: Cid,
    pub url: String,
    pub metadata: Value,
}

/// Caller metadata merged with the primary file's derived attributes
pub fn build_metadata(files: &[UploadFile], metadata: Option<Value>, uploaded_at: DateTime<Utc>) -> Value {
    let mut doc = match metadata {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("metadata".to_string(), other);
            map
        }
    };

    if let Some(primary) = files.first() {
        doc.insert("name".to_string(), json!(primary.name));
        doc.insert("type".to_string(), json!(primary.content_type));
        doc.insert("size".to_string(), json!(primary.size()));
    }
    doc.insert(
        "uploadedAt".to_string(),
        json!(uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    if files.len() > 1 {
        let listing: Vec<Value> = files
            .iter()
            .map(|f| json!({ "name": f.name, "type": f.content_type, "size": f.size() }))
            .collect();
        doc.insert("files".to_string(), Value::Array(listing));
    }

    Value::Object(doc)
}

/// `{base}/ipfs/{cid}/{file}` with the file name percent-encoded
pub fn gateway_url(base: &str, cid: &Cid, file_name: &str) -> String {
    format!(
        "{}/ipfs/{}/{}",
        base.trim_end_matches('/'),
        cid,
        urlencoding::encode(file_name)
    )
}

pub async fn upload(
    provider: Arc<dyn CapabilityProvider>,
    gateway_base: &str,
    request: UploadRequest,
) -> Result<UploadOutcome> {
    if request.files.is_empty() {
        return Err(GatewayError::Validation("No files provided".to_string()));
    }
    if let Some(file) = request.files.iter().find(|f| f.name.trim().is_empty()) {
        return Err(GatewayError::Validation(format!(
            "Every file needs a name ({} bytes unnamed)",
            file.size()
        )));
    }
    if request.files.iter().any(|f| f.name == METADATA_FILE) {
        return Err(GatewayError::Validation(format!(
            "{} is reserved for upload metadata",
            METADATA_FILE
        )));
    }

    let session = Session::open(provider, &request.email).await?;
    let space = match (request.space_did.as_deref(), request.space_name.as_deref()) {
        (Some(did), _) if !did.trim().is_empty() => session.use_space(did.trim()).await?,
        (_, Some(name)) if !name.trim().is_empty() => {
            let space = session.find_space_by_name(name.trim()).await?;
            session.provider().set_current_space(&space.did).await?;
            space
        }
        _ => {
            return Err(GatewayError::Validation(
                "spaceDid or spaceName is required".to_string(),
            ))
        }
    };

    let metadata = build_metadata(&request.files, request.metadata, Utc::now());
    let companion = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| GatewayError::Internal(format!("Failed to encode metadata: {}", e)))?;

    let primary = request.files[0].name.clone();
    let mut files = request.files;
    files.push(UploadFile::new(METADATA_FILE, "application/json", companion));
    let count = files.len();

    let cid = session.provider().upload_directory(&space.did, files).await?;
    let url = gateway_url(gateway_base, &cid, &primary);

    info!(space = %space.did, cid = %cid, files = count, "Upload complete");

    Ok(UploadOutcome { cid, url, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{content_id, DAG_CBOR};
    use chrono::TimeZone;

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 20, 30, 0).unwrap()
    }

    #[test]
    fn test_metadata_merges_derived_fields() {
        let files = vec![UploadFile::new("live.mp3", "audio/mpeg", vec![0u8; 42])];
        let metadata = build_metadata(
            &files,
            Some(json!({ "title": "Live at the Roxy", "name": "overridden" })),
            when(),
        );

        assert_eq!(metadata["title"], "Live at the Roxy");
        assert_eq!(metadata["name"], "live.mp3");
        assert_eq!(metadata["type"], "audio/mpeg");
        assert_eq!(metadata["size"], 42);
        assert_eq!(metadata["uploadedAt"], "2024-06-01T20:30:00.000Z");
        assert!(metadata.get("files").is_none());
    }

    #[test]
    fn test_metadata_lists_multiple_files() {
        let files = vec![
            UploadFile::new("cover.png", "image/png", vec![1u8; 3]),
            UploadFile::new("back.png", "image/png", vec![1u8; 5]),
        ];
        let metadata = build_metadata(&files, Some(json!("liner notes")), when());

        assert_eq!(metadata["metadata"], "liner notes");
        assert_eq!(metadata["files"].as_array().unwrap().len(), 2);
        assert_eq!(metadata["files"][1]["size"], 5);
    }

    #[test]
    fn test_gateway_url_encodes_name() {
        let cid = content_id(DAG_CBOR, b"dir");
        assert_eq!(
            gateway_url("https://w3s.link/", &cid, "Tour Poster #1.png"),
            format!("https://w3s.link/ipfs/{}/Tour%20Poster%20%231.png", cid)
        );
    }
}
