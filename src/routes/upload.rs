//! `POST /api/upload` (multipart/form-data)
//!
//! Text fields: `email`, `spaceDid`, `spaceName`, `metadata` (JSON text).
//! Every part carrying a filename is an uploaded file; the first one is the
//! primary file the returned URL points at.

use bytes::Bytes;
use futures::stream;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::{respond, Reply};
use crate::capability::UploadFile;
use crate::server::AppState;
use crate::services::{self, UploadRequest};
use crate::types::{GatewayError, Result};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Serialize)]
struct UploadResponse {
    cid: String,
    url: String,
    metadata: Value,
}

/// Split a multipart body into the upload request
pub async fn read_multipart(content_type: Option<&str>, body: Bytes) -> Result<UploadRequest> {
    let content_type = content_type.ok_or_else(|| {
        GatewayError::Validation("Content-Type must be multipart/form-data".to_string())
    })?;
    let boundary = multer::parse_boundary(content_type)?;
    let mut multipart = multer::Multipart::new(
        stream::once(async move { Ok::<_, std::io::Error>(body) }),
        boundary,
    );

    let mut request = UploadRequest::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            let bytes = field.bytes().await?;
            request.files.push(UploadFile::new(file_name, content_type, bytes));
            continue;
        }

        let text = field.text().await?;
        match name.as_str() {
            "email" => request.email = text,
            "spaceDid" => request.space_did = Some(text),
            "spaceName" => request.space_name = Some(text),
            "metadata" if !text.trim().is_empty() => {
                let metadata = serde_json::from_str(&text).map_err(|e| {
                    GatewayError::Validation(format!("metadata must be JSON: {}", e))
                })?;
                request.metadata = Some(metadata);
            }
            _ => {}
        }
    }

    Ok(request)
}

async fn do_upload(
    state: &AppState,
    content_type: Option<String>,
    body: Bytes,
) -> Result<Reply<UploadResponse>> {
    let request = read_multipart(content_type.as_deref(), body).await?;
    let outcome = services::upload(state.provider.clone(), state.args.gateway_base(), request).await?;

    Ok(Reply::with_message(
        "Upload complete",
        UploadResponse {
            cid: outcome.cid.to_string(),
            url: outcome.url,
            metadata: outcome.metadata,
        },
    ))
}

pub async fn upload(state: Arc<AppState>, content_type: Option<String>, body: Bytes) -> Response<Full<Bytes>> {
    respond(do_upload(&state, content_type, body).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-BANDSTAND-BOUNDARY";

    fn multipart_body() -> Bytes {
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"email\"\r\n\r\n\
             drums@band.example\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"spaceDid\"\r\n\r\n\
             did:key:zSpace\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"metadata\"\r\n\r\n\
             {{\"title\":\"Soundcheck\"}}\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"check.wav\"\r\n\
             Content-Type: audio/wav\r\n\r\n\
             RIFF....\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        );
        Bytes::from(body)
    }

    #[tokio::test]
    async fn test_read_multipart() {
        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        let request = read_multipart(Some(&content_type), multipart_body()).await.unwrap();

        assert_eq!(request.email, "drums@band.example");
        assert_eq!(request.space_did.as_deref(), Some("did:key:zSpace"));
        assert_eq!(request.metadata.unwrap()["title"], "Soundcheck");
        assert_eq!(request.files.len(), 1);
        assert_eq!(request.files[0].name, "check.wav");
        assert_eq!(request.files[0].content_type, "audio/wav");
        assert_eq!(&request.files[0].bytes[..], b"RIFF....");
    }

    #[tokio::test]
    async fn test_read_multipart_requires_boundary() {
        assert!(matches!(
            read_multipart(Some("application/json"), Bytes::new()).await,
            Err(GatewayError::Validation(_))
        ));
        assert!(read_multipart(None, Bytes::new()).await.is_err());
    }
}
