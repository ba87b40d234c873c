//! Upload queue manager
//!
//! Owns an ordered queue of uploads and pumps them one at a time through a
//! [`Transport`]. Failed attempts are retried automatically up to the
//! configured bound; everything else is surfaced through queue inspection.
//!
//! # Example
//!
//! ```no_run
//! use cms_admin_core::config::UploadQueueConfig;
//! use cms_admin_core::upload::http::HttpTransport;
//! use cms_admin_core::upload::{Destination, UploadPayload, UploadQueueManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("https://cms.example.com/api/media/upload")?;
//! let manager = UploadQueueManager::new(Arc::new(transport), UploadQueueConfig::default());
//!
//! manager.enqueue(
//!     vec![UploadPayload::new("hero.png", std::fs::read("hero.png")?)],
//!     Destination::new("media", "/banners"),
//! );
//! manager.wait_until_idle().await;
//! println!("{:?}", manager.queue_stats());
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! All state lives behind one mutex; selecting the next item and marking it
//! `Uploading` happen under the same lock, so at most one item is ever in
//! flight no matter how many pump tasks are scheduled.

use super::progress::{aggregate_progress, QueueSnapshot, QueueStats};
use super::transport::{ProgressCallback, Transport, TransportError, TransportRequest, TransportResponse};
use super::{Destination, UploadError, UploadId, UploadItem, UploadPayload, UploadStatus};
use crate::config::UploadQueueConfig;
use crate::metrics;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};

/// The item currently handed to the transport
struct InFlight {
    id: UploadId,
    /// Distinguishes attempts on the same item after cancel and retry
    attempt: u64,
    /// Sending or dropping this aborts the transport future
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct QueueState {
    items: Vec<UploadItem>,
    is_uploading: bool,
    paused: bool,
    current: Option<InFlight>,
    global_progress: u8,
    next_attempt: u64,
}

impl QueueState {
    fn item_mut(&mut self, id: UploadId) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn is_current(&self, id: UploadId) -> bool {
        self.current.as_ref().is_some_and(|c| c.id == id)
    }

    fn is_current_attempt(&self, attempt: u64) -> bool {
        self.current.as_ref().is_some_and(|c| c.attempt == attempt)
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            stats: QueueStats::from_items(&self.items),
            global_progress: self.global_progress,
            is_uploading: self.is_uploading,
            paused: self.paused,
        }
    }
}

struct Inner {
    state: Mutex<QueueState>,
    transport: Arc<dyn Transport>,
    config: UploadQueueConfig,
    snapshots: watch::Sender<QueueSnapshot>,
}

/// Work picked by the pump for one attempt
struct Job {
    id: UploadId,
    attempt: u64,
    payload: UploadPayload,
    destination: Destination,
    cancel: oneshot::Receiver<()>,
}

enum Outcome {
    Finished(Result<TransportResponse, TransportError>),
    Aborted,
}

/// Single-lane upload queue
///
/// Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct UploadQueueManager {
    inner: Arc<Inner>,
}

impl UploadQueueManager {
    /// Create an empty queue driven by `transport`
    pub fn new(transport: Arc<dyn Transport>, config: UploadQueueConfig) -> Self {
        let (snapshots, _) = watch::channel(QueueSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                transport,
                config,
                snapshots,
            }),
        }
    }

    /// Append files to the queue tail as `Pending`
    ///
    /// Nothing is uploaded synchronously; the pump is started in the
    /// background if it is idle.
    pub fn enqueue(&self, files: Vec<UploadPayload>, destination: Destination) -> Vec<UploadId> {
        let mut ids = Vec::with_capacity(files.len());
        {
            let mut state = self.inner.state.lock();
            for payload in files {
                let item = UploadItem::new(payload, destination.clone());
                ids.push(item.id);
                state.items.push(item);
            }
            self.commit(&mut state);
        }

        tracing::debug!(
            count = ids.len(),
            namespace = %destination.namespace,
            folder = %destination.folder,
            "Enqueued uploads"
        );

        self.kick();
        ids
    }

    /// Remove an item regardless of its status
    ///
    /// Removing the in-flight item does not interrupt its transport call; the
    /// eventual outcome is discarded.
    pub fn remove(&self, id: UploadId) -> Result<UploadItem, UploadError> {
        let mut state = self.inner.state.lock();
        let index = state
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or(UploadError::NotFound(id))?;
        let item = state.items.remove(index);
        self.commit(&mut state);
        Ok(item)
    }

    /// Put a non-uploading item back to `Pending`
    ///
    /// `retry_count` is preserved.
    pub fn retry(&self, id: UploadId) -> Result<(), UploadError> {
        {
            let mut state = self.inner.state.lock();
            let item = state.item_mut(id).ok_or(UploadError::NotFound(id))?;
            if item.status == UploadStatus::Uploading {
                return Err(UploadError::InvalidState {
                    id,
                    status: item.status,
                    action: "retry",
                });
            }
            item.status = UploadStatus::Pending;
            item.progress = 0;
            item.error = None;
            item.result = None;
            item.completed_at = None;
            self.commit(&mut state);
        }

        tracing::info!(upload.id = %id, "Manual retry requested");
        self.kick();
        Ok(())
    }

    /// Mark an item `Cancelled`
    ///
    /// Cancelling the in-flight item aborts its transport future and frees
    /// the lane for the next pending item.
    pub fn cancel(&self, id: UploadId) -> Result<(), UploadError> {
        let (namespace, was_current) = {
            let mut state = self.inner.state.lock();
            let item = state.item_mut(id).ok_or(UploadError::NotFound(id))?;
            item.status = UploadStatus::Cancelled;
            item.error = None;
            item.result = None;
            item.completed_at = None;
            let namespace = item.destination.namespace.clone();

            let was_current = state.is_current(id);
            if was_current {
                if let Some(in_flight) = state.current.take() {
                    let _ = in_flight.cancel.send(());
                }
                state.is_uploading = false;
            }
            self.commit(&mut state);
            (namespace, was_current)
        };

        metrics::record_upload_outcome(&namespace, "cancelled");
        tracing::info!(upload.id = %id, in_flight = was_current, "Upload cancelled");

        if was_current {
            self.spawn_pump(self.inner.config.pump_delay());
        }
        Ok(())
    }

    /// Pause the queue and cancel every item that has not finished
    ///
    /// The in-flight transfer is aborted. Items stay in the queue so callers
    /// can still report on them. Returns how many items were cancelled.
    pub fn cancel_remaining(&self) -> usize {
        let cancelled = {
            let mut state = self.inner.state.lock();
            state.paused = true;
            let mut cancelled = 0;
            for item in state.items.iter_mut().filter(|i| {
                matches!(
                    i.status,
                    UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Paused
                )
            }) {
                item.status = UploadStatus::Cancelled;
                metrics::record_upload_outcome(&item.destination.namespace, "cancelled");
                cancelled += 1;
            }
            if let Some(in_flight) = state.current.take() {
                let _ = in_flight.cancel.send(());
            }
            state.is_uploading = false;
            self.commit(&mut state);
            cancelled
        };

        tracing::info!(cancelled, "Cancelled remaining uploads");
        cancelled
    }

    /// Stop starting new uploads; the in-flight one is left to finish
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        state.paused = true;
        self.commit(&mut state);
        tracing::info!("Upload queue paused");
    }

    /// Lift [`pause`](Self::pause) and restart the pump if idle
    pub fn resume(&self) {
        {
            let mut state = self.inner.state.lock();
            state.paused = false;
            self.commit(&mut state);
        }
        tracing::info!("Upload queue resumed");
        self.kick();
    }

    /// Hold a pending item back from the pump
    pub fn pause_item(&self, id: UploadId) -> Result<(), UploadError> {
        self.transition(id, UploadStatus::Pending, UploadStatus::Paused, "pause")
    }

    /// Return a paused item to `Pending`
    pub fn resume_item(&self, id: UploadId) -> Result<(), UploadError> {
        self.transition(id, UploadStatus::Paused, UploadStatus::Pending, "resume")?;
        self.kick();
        Ok(())
    }

    /// Drop all `Completed` and `Cancelled` items, returning how many went
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.items.len();
        state
            .items
            .retain(|i| !matches!(i.status, UploadStatus::Completed | UploadStatus::Cancelled));
        let removed = before - state.items.len();
        self.commit(&mut state);
        removed
    }

    /// Empty the queue and reset to the initial state
    ///
    /// An in-flight transport call is aborted.
    pub fn clear_all(&self) {
        let mut state = self.inner.state.lock();
        // Keep the attempt counter so stale attempts never match new ones
        let next_attempt = state.next_attempt;
        *state = QueueState {
            next_attempt,
            ..QueueState::default()
        };
        self.commit(&mut state);
        tracing::info!("Upload queue cleared");
    }

    pub fn queue_stats(&self) -> QueueStats {
        QueueStats::from_items(&self.inner.state.lock().items)
    }

    pub fn get_upload(&self, id: UploadId) -> Option<UploadItem> {
        self.inner
            .state
            .lock()
            .items
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    /// All items in queue order
    pub fn uploads(&self) -> Vec<UploadItem> {
        self.inner.state.lock().items.clone()
    }

    pub fn global_progress(&self) -> u8 {
        self.inner.state.lock().global_progress
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.state.lock().is_uploading
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receiver that observes a fresh [`QueueSnapshot`] after every mutation
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Resolve once nothing is in flight and the pump has nothing to start
    pub async fn wait_until_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(QueueSnapshot::is_idle).await;
    }

    // ------------------------------------------------------------------------
    // Pump
    // ------------------------------------------------------------------------

    fn commit(&self, state: &mut QueueState) {
        state.global_progress = aggregate_progress(&state.items);
        self.inner.snapshots.send_replace(state.snapshot());
    }

    fn transition(
        &self,
        id: UploadId,
        from: UploadStatus,
        to: UploadStatus,
        action: &'static str,
    ) -> Result<(), UploadError> {
        let mut state = self.inner.state.lock();
        let item = state.item_mut(id).ok_or(UploadError::NotFound(id))?;
        if item.status != from {
            return Err(UploadError::InvalidState {
                id,
                status: item.status,
                action,
            });
        }
        item.status = to;
        self.commit(&mut state);
        Ok(())
    }

    /// Start the pump unless an upload is already in flight
    fn kick(&self) {
        if !self.inner.state.lock().is_uploading {
            self.spawn_pump(Duration::ZERO);
        }
    }

    fn spawn_pump(&self, delay: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No Tokio runtime available, upload pump not started");
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            this.run_pump().await;
        });
    }

    async fn run_pump(self) {
        while let Some(job) = self.begin_next() {
            let (id, attempt) = (job.id, job.attempt);
            let started = Instant::now();
            let outcome = self.execute(job).await;
            self.finish(id, attempt, outcome, started.elapsed());
            tokio::time::sleep(self.inner.config.pump_delay()).await;
        }
    }

    /// Pick the first pending item and mark it in flight
    fn begin_next(&self) -> Option<Job> {
        let mut state = self.inner.state.lock();
        if state.is_uploading || state.paused {
            return None;
        }

        let Some(index) = state
            .items
            .iter()
            .position(|i| i.status == UploadStatus::Pending)
        else {
            state.current = None;
            self.commit(&mut state);
            return None;
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let attempt = state.next_attempt;
        state.next_attempt += 1;
        let item = &mut state.items[index];
        item.status = UploadStatus::Uploading;
        item.started_at.get_or_insert_with(Utc::now);
        let job = Job {
            id: item.id,
            attempt,
            payload: item.payload.clone(),
            destination: item.destination.clone(),
            cancel: cancel_rx,
        };

        state.current = Some(InFlight {
            id: job.id,
            attempt,
            cancel: cancel_tx,
        });
        state.is_uploading = true;
        self.commit(&mut state);
        Some(job)
    }

    #[tracing::instrument(
        name = "upload.attempt",
        skip(self, job),
        fields(
            upload.id = %job.id,
            upload.filename = %job.payload.filename,
            upload.bytes = job.payload.len(),
            upload.namespace = %job.destination.namespace
        )
    )]
    async fn execute(&self, job: Job) -> Outcome {
        let Job {
            id,
            attempt,
            payload,
            destination,
            cancel,
        } = job;

        let weak = Arc::downgrade(&self.inner);
        let on_progress: ProgressCallback = Arc::new(move |percent| {
            if let Some(inner) = weak.upgrade() {
                UploadQueueManager { inner }.record_progress(id, attempt, percent);
            }
        });

        let request = TransportRequest {
            payload,
            destination,
            on_progress,
        };
        let transport = Arc::clone(&self.inner.transport);

        tokio::select! {
            result = transport.upload(request) => Outcome::Finished(result),
            _ = cancel => Outcome::Aborted,
        }
    }

    fn record_progress(&self, id: UploadId, attempt: u64, percent: u8) {
        let mut state = self.inner.state.lock();
        if !state.is_current_attempt(attempt) {
            return;
        }
        let Some(item) = state.item_mut(id) else {
            return;
        };
        let percent = percent.min(100);
        if item.status != UploadStatus::Uploading || percent <= item.progress {
            return;
        }
        item.progress = percent;
        self.commit(&mut state);
    }

    fn finish(&self, id: UploadId, attempt: u64, outcome: Outcome, elapsed: Duration) {
        let mut state = self.inner.state.lock();
        // A cancelled attempt may finish after the item was retried and
        // picked up again; only the attempt still in flight owns the lane
        let owns_lane = state.is_current_attempt(attempt);
        if owns_lane {
            state.current = None;
            state.is_uploading = false;
        }

        let max_retries = self.inner.config.max_retries;
        match state.item_mut(id) {
            Some(item) if owns_lane && item.status == UploadStatus::Uploading => {
                metrics::record_upload_duration(&item.destination.namespace, elapsed.as_secs_f64());
                match outcome {
                    Outcome::Finished(result) => apply_outcome(item, result, max_retries),
                    Outcome::Aborted => item.status = UploadStatus::Cancelled,
                }
            }
            Some(item) => {
                tracing::debug!(
                    upload.id = %id,
                    status = %item.status,
                    "Discarding transport outcome for upload no longer in flight"
                );
            }
            None => {
                tracing::debug!(upload.id = %id, "Discarding transport outcome for removed upload");
            }
        }

        self.commit(&mut state);
    }
}

/// Fold one transport outcome into an in-flight item
fn apply_outcome(
    item: &mut UploadItem,
    result: Result<TransportResponse, TransportError>,
    max_retries: u32,
) {
    let namespace = item.destination.namespace.clone();
    match result {
        Ok(response) => {
            if let Some(rejection) = response.rejection_for(&item.payload.filename) {
                tracing::warn!(
                    upload.id = %item.id,
                    upload.filename = %item.payload.filename,
                    reason = %rejection.error,
                    "Upload rejected by backend"
                );
                item.status = UploadStatus::Failed;
                item.error = Some(rejection.error.clone());
                item.completed_at = Some(Utc::now());
                metrics::record_upload_outcome(&namespace, "rejected");
                return;
            }

            item.status = UploadStatus::Completed;
            item.progress = 100;
            item.error = None;
            item.result = Some(response);
            item.completed_at = Some(Utc::now());
            metrics::record_upload_outcome(&namespace, "completed");
            metrics::record_upload_bytes(item.payload.len() as u64);
            tracing::info!(
                upload.id = %item.id,
                upload.filename = %item.payload.filename,
                retries = item.retry_count,
                "Upload completed"
            );
        }
        Err(e) if item.retry_count < max_retries => {
            item.retry_count += 1;
            item.status = UploadStatus::Pending;
            item.progress = 0;
            metrics::record_upload_outcome(&namespace, "retried");
            tracing::warn!(
                upload.id = %item.id,
                upload.filename = %item.payload.filename,
                attempt = item.retry_count,
                max_retries,
                error = %e,
                "Upload attempt failed, will retry"
            );
        }
        Err(e) => {
            item.status = UploadStatus::Failed;
            item.error = Some(e.to_string());
            item.completed_at = Some(Utc::now());
            metrics::record_upload_outcome(&namespace, "failed");
            tracing::error!(
                upload.id = %item.id,
                upload.filename = %item.payload.filename,
                error = %e,
                "Upload failed after exhausting retries"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploading_item(name: &str) -> UploadItem {
        let mut item = UploadItem::new(
            UploadPayload::new(name, vec![0u8; 8]),
            Destination::new("media", "/"),
        );
        item.status = UploadStatus::Uploading;
        item.progress = 42;
        item
    }

    #[test]
    fn test_apply_success() {
        let mut item = uploading_item("a.png");
        apply_outcome(&mut item, Ok(TransportResponse::accepted(1)), 3);
        assert_eq!(item.status, UploadStatus::Completed);
        assert_eq!(item.progress, 100);
        assert!(item.result.is_some());
        assert!(item.completed_at.is_some());
    }

    #[test]
    fn test_apply_rejection_does_not_consume_retry() {
        let mut item = uploading_item("dup.png");
        apply_outcome(
            &mut item,
            Ok(TransportResponse::rejected("dup.png", "Duplicate file")),
            3,
        );
        assert_eq!(item.status, UploadStatus::Failed);
        assert_eq!(item.error.as_deref(), Some("Duplicate file"));
        assert_eq!(item.retry_count, 0);
        assert!(item.result.is_none());
    }

    #[test]
    fn test_apply_rejection_of_other_file_is_success() {
        let mut item = uploading_item("a.png");
        apply_outcome(
            &mut item,
            Ok(TransportResponse::rejected("b.png", "Duplicate file")),
            3,
        );
        assert_eq!(item.status, UploadStatus::Completed);
    }

    #[test]
    fn test_apply_failure_retries_then_fails() {
        let mut item = uploading_item("a.png");
        for attempt in 1..=3 {
            apply_outcome(&mut item, Err(TransportError::Timeout), 3);
            assert_eq!(item.status, UploadStatus::Pending);
            assert_eq!(item.retry_count, attempt);
            assert_eq!(item.progress, 0);
            item.status = UploadStatus::Uploading;
        }

        apply_outcome(&mut item, Err(TransportError::Timeout), 3);
        assert_eq!(item.status, UploadStatus::Failed);
        assert_eq!(item.retry_count, 3);
        assert_eq!(item.error.as_deref(), Some("Upload timed out"));
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let mut item = uploading_item("a.png");
        apply_outcome(&mut item, Err(TransportError::Request("refused".into())), 0);
        assert_eq!(item.status, UploadStatus::Failed);
        assert_eq!(item.retry_count, 0);
    }
}
