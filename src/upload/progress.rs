//! Queue statistics and aggregate progress

use super::{UploadItem, UploadStatus};
use serde::Serialize;

/// Per-status item counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub paused: usize,
}

impl QueueStats {
    pub fn from_items(items: &[UploadItem]) -> Self {
        let mut stats = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading => stats.uploading += 1,
                UploadStatus::Completed => stats.completed += 1,
                UploadStatus::Failed => stats.failed += 1,
                UploadStatus::Cancelled => stats.cancelled += 1,
                UploadStatus::Paused => stats.paused += 1,
            }
        }
        stats
    }
}

/// Point-in-time view of the queue, published after every mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub stats: QueueStats,
    pub global_progress: u8,
    pub is_uploading: bool,
    pub paused: bool,
}

impl QueueSnapshot {
    /// Nothing in flight, and nothing the pump would pick up next
    pub fn is_idle(&self) -> bool {
        !self.is_uploading && (self.stats.pending == 0 || self.paused)
    }
}

/// `round(sum(contribution) / len)`, 0 for an empty queue
pub fn aggregate_progress(items: &[UploadItem]) -> u8 {
    if items.is_empty() {
        return 0;
    }
    let sum: u64 = items.iter().map(|i| u64::from(i.contribution())).sum();
    let len = items.len() as u64;
    // Integer round-half-up of sum / len
    let rounded = (2 * sum + len) / (2 * len);
    rounded.min(100) as u8
}
