//! Wire calls against the Nestbook backend.
//!
//! `ApiClient` is the production `UploadTransport` (multipart POST to the
//! upload endpoint) and `ImageLoader` (GET through the image proxy).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use nestbook_core::{guess_content_type, CandidateFile, Folder, UploadResult};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::{TransferError, GENERIC_UPLOAD_FAILURE};
use crate::image::ImageLoader;
use crate::progress::FileProgress;
use crate::upload::UploadTransport;
use crate::ApiClient;

const CHUNK_SIZE: usize = 64 * 1024;
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload endpoint response. Failures only carry `success` and `message`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    key: Option<String>,
    url: Option<String>,
    file_name: Option<String>,
    message: Option<String>,
}

impl UploadResponse {
    fn into_result(self, local_name: &str) -> Result<UploadResult, TransferError> {
        if !self.success {
            return Err(TransferError::Server {
                message: self
                    .message
                    .unwrap_or_else(|| GENERIC_UPLOAD_FAILURE.to_string()),
            });
        }
        match (self.key, self.url) {
            (Some(key), Some(url)) => Ok(UploadResult {
                key,
                url,
                file_name: self.file_name.unwrap_or_else(|| local_name.to_string()),
            }),
            _ => Err(TransferError::InvalidResponse(
                "upload response is missing key or url".to_string(),
            )),
        }
    }
}

/// Request body that reports progress as chunks are handed to the connection.
fn progress_body(data: Bytes, progress: Arc<FileProgress>) -> reqwest::Body {
    let total = data.len();
    progress.report(0);

    let chunks: Vec<Bytes> = (0..total)
        .step_by(CHUNK_SIZE)
        .map(|start| data.slice(start..(start + CHUNK_SIZE).min(total)))
        .collect();

    let mut sent = 0usize;
    let stream = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len();
        let percent = (sent * 100 / total.max(1)).min(100) as u8;
        progress.report(percent);
        Ok::<Bytes, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(stream)
}

/// Multipart part for `file`. A declared type that does not parse as a MIME
/// type is replaced by the one guessed from the file name.
fn file_part(file: &CandidateFile, progress: Arc<FileProgress>) -> Result<Part, TransferError> {
    let part = Part::stream_with_length(progress_body(file.data.clone(), progress), file.size() as u64)
        .file_name(file.name.clone());
    if file.content_type.is_empty() {
        return Ok(part);
    }

    let content_type = if is_mime(&file.content_type) {
        file.content_type.as_str()
    } else {
        let fallback = guess_content_type(&file.name).unwrap_or(FALLBACK_CONTENT_TYPE);
        tracing::warn!(
            file_name = %file.name,
            declared = %file.content_type,
            fallback,
            "Declared content type is not a valid MIME type"
        );
        fallback
    };
    part.mime_str(content_type)
        .map_err(|e| TransferError::InvalidRequest(e.to_string()))
}

fn is_mime(content_type: &str) -> bool {
    Part::bytes(Vec::new()).mime_str(content_type).is_ok()
}

#[async_trait]
impl UploadTransport for ApiClient {
    async fn upload(
        &self,
        file: &CandidateFile,
        folder: &Folder,
        progress: Arc<FileProgress>,
    ) -> Result<UploadResult, TransferError> {
        let part = file_part(file, progress)?;

        let form = Form::new()
            .part("file", part)
            .text("folder", folder.as_str().to_string());

        let url = self.config().upload_url();
        let response = self
            .apply_auth(self.client().post(&url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<UploadResponse>(&body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| GENERIC_UPLOAD_FAILURE.to_string());
            return Err(TransferError::Http {
                status: status.as_u16(),
                message,
            });
        }

        parsed
            .map_err(|e| TransferError::InvalidResponse(e.to_string()))?
            .into_result(&file.name)
    }
}

#[async_trait]
impl ImageLoader for ApiClient {
    async fn load(&self, url: &str) -> Result<Bytes, TransferError> {
        let mut request = self.client().get(self.build_url(url));
        if self.is_api_origin(url) {
            request = self.apply_auth(request);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Http {
                status: status.as_u16(),
                message: format!("Failed to load image {}", url),
            });
        }

        Ok(response.bytes().await?)
    }
}
