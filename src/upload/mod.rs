//! Upload module
//!
//! Sequential upload queue with bounded retry, driven through a pluggable
//! [`Transport`](transport::Transport).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod progress;
pub mod queue;
pub mod transport;

pub use progress::{QueueSnapshot, QueueStats};
pub use queue::UploadQueueManager;
pub use transport::{
    ProgressCallback, RejectedFile, Transport, TransportError, TransportRequest, TransportResponse,
};

/// Upload queue errors
///
/// Only caller mistakes surface here. Transport failures are recorded on the
/// affected [`UploadItem`] and never returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Upload not found: {0}")]
    NotFound(UploadId),

    #[error("Invalid state for {id}: {status} ({action})")]
    InvalidState {
        id: UploadId,
        status: UploadStatus,
        action: &'static str,
    },
}

/// Opaque upload identifier, generated at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(uuid::Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Upload lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an upload should land
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub namespace: String,
    pub folder: String,
}

impl Destination {
    pub fn new(namespace: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            folder: folder.into(),
        }
    }
}

/// File handed to the queue by the caller
///
/// `data` is reference-counted; cloning a payload never copies file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadPayload {
    pub filename: String,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub data: Bytes,
}

impl UploadPayload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One entry of the upload queue
///
/// Serializes without the file bytes.
#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    pub id: UploadId,
    pub payload: UploadPayload,
    pub destination: Destination,
    pub status: UploadStatus,
    /// Percentage, 0..=100
    pub progress: u8,
    /// Present only when `status == Failed`
    pub error: Option<String>,
    /// Present only when `status == Completed`
    pub result: Option<TransportResponse>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadItem {
    pub(crate) fn new(payload: UploadPayload, destination: Destination) -> Self {
        Self {
            id: UploadId::new(),
            payload,
            destination,
            status: UploadStatus::Pending,
            progress: 0,
            error: None,
            result: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.payload.filename
    }

    /// Contribution of this item to the aggregate progress
    pub fn contribution(&self) -> u32 {
        match self.status {
            UploadStatus::Completed => 100,
            UploadStatus::Uploading => u32::from(self.progress),
            _ => 0,
        }
    }
}
