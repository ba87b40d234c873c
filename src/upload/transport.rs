//! Upload transport contract
//!
//! The queue never talks to the network itself. Each attempt is handed to a
//! [`Transport`], which reports progress through a callback and answers with a
//! batch-shaped [`TransportResponse`] even for single-file calls.

use super::{Destination, UploadPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Progress callback, invoked with a percentage in `0..=100`
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Upload endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Upload timed out")]
    Timeout,
}

/// A single upload attempt
pub struct TransportRequest {
    pub payload: UploadPayload,
    pub destination: Destination,
    pub on_progress: ProgressCallback,
}

impl TransportRequest {
    /// Report progress, clamped to 100
    pub fn report_progress(&self, percent: u8) {
        (self.on_progress)(percent.min(100));
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("filename", &self.payload.filename)
            .field("bytes", &self.payload.len())
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// File rejected by the backend even though the call succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub filename: String,
    pub error: String,
}

/// Successful transport answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportResponse {
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub rejected_files: Vec<RejectedFile>,
}

impl TransportResponse {
    pub fn accepted(count: u32) -> Self {
        Self {
            success: count,
            rejected_files: Vec::new(),
        }
    }

    pub fn rejected(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: 0,
            rejected_files: vec![RejectedFile {
                filename: filename.into(),
                error: error.into(),
            }],
        }
    }

    /// Rejection entry for `filename`, matched exactly
    pub fn rejection_for(&self, filename: &str) -> Option<&RejectedFile> {
        self.rejected_files.iter().find(|r| r.filename == filename)
    }
}

/// Upload transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload one payload. Must fail rather than hang: the queue has no
    /// timeout of its own.
    async fn upload(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
