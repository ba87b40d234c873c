//! HTTP upload transport
//!
//! Posts each payload as `multipart/form-data` to the CMS media endpoint.
//! The file part is streamed in fixed-size slices of the payload's shared
//! buffer so progress can be reported without copying the file.

use super::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::config::TransportConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Default slice size for streamed uploads (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `reqwest`-backed [`Transport`]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    chunk_size: usize,
}

impl HttpTransport {
    /// Create a transport with default timeout and chunk size
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        Self::build(endpoint.into(), None, DEFAULT_TIMEOUT, DEFAULT_CHUNK_SIZE)
    }

    /// Create a transport from configuration
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let auth_token = config
            .auth_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string);
        Self::build(
            config.endpoint.clone(),
            auth_token,
            Duration::from_secs(config.timeout_seconds),
            config.chunk_size,
        )
    }

    fn build(
        endpoint: String,
        auth_token: Option<String>,
        timeout: Duration,
        chunk_size: usize,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            auth_token,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Use a bearer token for every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Override the streaming slice size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Split `data` into `chunk_size` slices sharing the same buffer
fn slices(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(
        name = "transport.http.upload",
        skip(self, request),
        fields(
            http.url = %self.endpoint,
            upload.filename = %request.payload.filename,
            upload.bytes = request.payload.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn upload(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let total = request.payload.len();
        let on_progress = request.on_progress.clone();
        let mut sent = 0usize;

        let chunks = slices(&request.payload.data, self.chunk_size);
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            let percent = if total == 0 { 100 } else { sent * 100 / total };
            on_progress(percent.min(100) as u8);
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total as u64)
            .file_name(request.payload.filename.clone());
        if let Some(content_type) = &request.payload.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| TransportError::Request(e.to_string()))?;
        }

        let form = Form::new()
            .text("namespace", request.destination.namespace.clone())
            .text("folder", request.destination.folder.clone())
            .part("files", part);

        let mut builder = self.client.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let parsed: TransportResponse =
            serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))?;

        if total == 0 {
            request.report_progress(100);
        }

        tracing::debug!(
            success = parsed.success,
            rejected = parsed.rejected_files.len(),
            "Upload endpoint responded"
        );
        Ok(parsed)
    }
}
