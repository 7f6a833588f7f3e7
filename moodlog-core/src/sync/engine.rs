//! Sync engine: drains the durable queue against the remote collector
//!
//! One drain pass works on a snapshot of the queue and delivers each record
//! with its own GET. A rejected record does not stop the pass; a transport
//! error does. The snapshot is cleared only when every record in it was
//! accepted, so a partially failed pass re-sends the whole backlog next time
//! and the collector must tolerate duplicates.

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::queue::DurableQueue;
use crate::record::Record;

use super::transport::{Response, Transport, TransportError};

/// Delivery outcome for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected(String),
    TransportError(TransportError),
}

/// Classify a final (post-redirect) response.
///
/// Accepted iff the status is 200 and the body contains `success_marker`.
pub fn classify(response: &Response, success_marker: &str) -> Outcome {
    if response.status != 200 {
        return Outcome::Rejected(format!("status {}", response.status));
    }
    if !response.body.contains(success_marker) {
        return Outcome::Rejected(format!("response body lacks {:?}", success_marker));
    }
    Outcome::Accepted
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Every attempted record was accepted and the pass ran to completion
    pub all_accepted: bool,
    /// Records a request was issued for, including the one that aborted the pass
    pub attempted: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Transport error that ended the pass early
    pub aborted: Option<TransportError>,
    /// Whether the snapshot was removed from the queue
    pub cleared: bool,
}

/// Receives progress notifications for display.
pub trait StatusSink {
    /// Called once before a non-empty drain starts.
    fn uploading_started(&self, pending: usize);
}

/// Status sink that ignores notifications.
pub struct NoStatus;

impl StatusSink for NoStatus {
    fn uploading_started(&self, _pending: usize) {}
}

/// Drains a [`DurableQueue`] through a [`Transport`].
pub struct SyncEngine<T> {
    transport: T,
    endpoint: String,
    success_marker: String,
}

impl<T: Transport> SyncEngine<T> {
    /// Create an engine delivering to `endpoint` with the default `Success` marker.
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            success_marker: EndpointConfig::default().success_marker,
        }
    }

    /// Create an engine from validated endpoint configuration.
    pub fn from_config(transport: T, config: &EndpointConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.url.clone().unwrap_or_default();
        Ok(Self::new(transport, endpoint).with_success_marker(config.success_marker.clone()))
    }

    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = marker.into();
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Drain the queue without status notifications.
    pub async fn drain(&self, queue: &DurableQueue) -> Result<SyncResult> {
        self.drain_with_status(queue, &NoStatus).await
    }

    /// Drain the queue, notifying `status` before the first request.
    ///
    /// Returns an error only for storage failures (reading the snapshot or
    /// clearing it). Rejections and transport errors are reported in the
    /// returned [`SyncResult`].
    pub async fn drain_with_status(&self, queue: &DurableQueue, status: &dyn StatusSink) -> Result<SyncResult> {
        let snapshot = queue.snapshot()?;
        if snapshot.is_empty() {
            tracing::debug!("Queue empty, nothing to sync");
            return Ok(SyncResult {
                all_accepted: true,
                ..Default::default()
            });
        }

        status.uploading_started(snapshot.len());
        tracing::info!(records = snapshot.len(), endpoint = %self.endpoint, "Starting sync");

        let mut result = SyncResult::default();
        for record in snapshot.records() {
            result.attempted += 1;
            match self.deliver(record).await {
                Outcome::Accepted => {
                    result.accepted += 1;
                    tracing::debug!(category = %record.category(), "Record accepted");
                }
                Outcome::Rejected(reason) => {
                    result.rejected += 1;
                    tracing::warn!(
                        date = %record.date(),
                        time = %record.time(),
                        category = %record.category(),
                        reason = %reason,
                        "Record rejected"
                    );
                }
                Outcome::TransportError(e) => {
                    tracing::warn!(
                        error = %e,
                        remaining = snapshot.len() - result.attempted,
                        "Transport error, aborting sync"
                    );
                    result.aborted = Some(e);
                    break;
                }
            }
        }

        result.all_accepted = result.aborted.is_none() && result.accepted == result.attempted;

        if result.all_accepted {
            queue.clear_snapshot(&snapshot)?;
            result.cleared = true;
            tracing::info!(accepted = result.accepted, "Sync complete, queue cleared");
        } else {
            tracing::info!(
                attempted = result.attempted,
                accepted = result.accepted,
                rejected = result.rejected,
                aborted = result.aborted.is_some(),
                "Sync incomplete, keeping queue"
            );
        }

        Ok(result)
    }

    /// Deliver one record, following at most one redirect.
    async fn deliver(&self, record: &Record) -> Outcome {
        let url = record.request_url(&self.endpoint);

        let response = match self.transport.get(&url).await {
            Ok(response) => response,
            Err(e) => return Outcome::TransportError(e),
        };

        let response = if response.is_redirect() {
            let target = match redirect_target(&url, &response) {
                Ok(target) => target,
                Err(e) => return Outcome::TransportError(e),
            };
            tracing::debug!(status = response.status, target = %target, "Following redirect");
            match self.transport.get(&target).await {
                Ok(response) => response,
                Err(e) => return Outcome::TransportError(e),
            }
        } else {
            response
        };

        classify(&response, &self.success_marker)
    }
}

/// Resolve the `Location` of a redirect against the request URL.
fn redirect_target(request_url: &str, response: &Response) -> std::result::Result<String, TransportError> {
    let location = response.header("Location").ok_or_else(|| {
        TransportError::Malformed(format!("redirect ({}) without Location header", response.status))
    })?;

    let base = reqwest::Url::parse(request_url)
        .map_err(|e| TransportError::Malformed(format!("invalid request URL: {}", e)))?;
    let target = base
        .join(location)
        .map_err(|e| TransportError::Malformed(format!("invalid Location {:?}: {}", location, e)))?;

    Ok(target.to_string())
}
