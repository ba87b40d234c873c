//! Common test infrastructure
//!
//! Provides a scripted in-memory transport for driving the upload queue
//! without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use cms_admin_core::config::UploadQueueConfig;
use cms_admin_core::upload::{
    Transport, TransportError, TransportRequest, TransportResponse, UploadPayload,
    UploadQueueManager,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Transport whose behaviour per filename is scripted up front
#[derive(Default)]
pub struct ScriptedTransport {
    /// Remaining failures per filename
    failures: Mutex<HashMap<String, u32>>,
    /// Backend rejections per filename
    rejections: HashMap<String, String>,
    /// Per-file latency; files not listed use `default_delay`
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    /// Progress values reported before sleeping
    progress_steps: Vec<u8>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            default_delay: Duration::from_millis(5),
            progress_steps: vec![50],
            ..Self::default()
        }
    }

    /// Fail the next `times` attempts for `filename`
    pub fn failing(self, filename: &str, times: u32) -> Self {
        self.failures.lock().insert(filename.to_string(), times);
        self
    }

    pub fn rejecting(mut self, filename: &str, reason: &str) -> Self {
        self.rejections
            .insert(filename.to_string(), reason.to_string());
        self
    }

    pub fn slow(mut self, filename: &str, delay: Duration) -> Self {
        self.delays.insert(filename.to_string(), delay);
        self
    }

    pub fn progress_steps(mut self, steps: Vec<u8>) -> Self {
        self.progress_steps = steps;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the upload future is dropped
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn upload(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let filename = request.payload.filename.clone();
        self.calls.lock().push(filename.clone());

        for step in &self.progress_steps {
            request.report_progress(*step);
        }

        let delay = self
            .delays
            .get(&filename)
            .copied()
            .unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;

        let should_fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&filename) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(TransportError::Request(format!(
                "connection reset while sending {}",
                filename
            )));
        }

        if let Some(reason) = self.rejections.get(&filename) {
            return Ok(TransportResponse::rejected(filename, reason.clone()));
        }

        Ok(TransportResponse::accepted(1))
    }
}

/// Queue config with a short pump delay for fast tests
pub fn fast_config() -> UploadQueueConfig {
    UploadQueueConfig {
        max_retries: 3,
        pump_delay_ms: 1,
    }
}

pub fn manager(transport: Arc<ScriptedTransport>) -> UploadQueueManager {
    UploadQueueManager::new(transport, fast_config())
}

pub fn files(names: &[&str]) -> Vec<UploadPayload> {
    names
        .iter()
        .map(|name| UploadPayload::new(*name, name.as_bytes().to_vec()))
        .collect()
}

/// Wait for the queue to drain, failing the test after five seconds
pub async fn drain(queue: &UploadQueueManager) {
    tokio::time::timeout(Duration::from_secs(5), queue.wait_until_idle())
        .await
        .expect("upload queue should become idle");
}

/// Wait until some item is in flight
pub async fn wait_for_upload_start(queue: &UploadQueueManager) {
    let mut rx = queue.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.stats.uploading == 1),
    )
    .await
    .expect("an upload should start")
    .expect("queue should still be alive");
}
