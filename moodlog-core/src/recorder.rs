//! Capture path: record a mood, then sync opportunistically

use chrono::{Local, NaiveDateTime};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::DurableQueue;
use crate::record::Record;
use crate::sync::{
    ConnectivityGate, Gate, HttpTransport, NoStatus, Offline, StatusSink, SyncEngine, SyncResult,
    Transport,
};

/// Why a sync was not attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No endpoint is configured
    NoEndpoint,
    /// The `[endpoint]` section failed validation
    InvalidEndpoint(String),
    /// The connectivity gate reported the network unreachable
    Offline,
}

/// What happened to the sync that follows a capture
#[derive(Debug)]
pub enum SyncStatus {
    Skipped(SkipReason),
    Completed(SyncResult),
    /// The drain hit a storage error
    Failed(Error),
}

impl SyncStatus {
    /// True if the queue was fully delivered and cleared
    pub fn is_clean(&self) -> bool {
        matches!(self, SyncStatus::Completed(result) if result.all_accepted)
    }
}

/// Result of capturing one event
#[derive(Debug)]
pub struct CaptureReport {
    pub record: Record,
    pub sync: SyncStatus,
}

/// Owns the queue and everything needed to drain it.
pub struct Recorder<T, G> {
    queue: DurableQueue,
    engine: Option<SyncEngine<T>>,
    gate: G,
    status: Box<dyn StatusSink>,
    /// Set when the endpoint was configured but rejected
    endpoint_error: Option<String>,
}

impl Recorder<HttpTransport, Gate> {
    /// Build a recorder from configuration.
    ///
    /// Without `endpoint.url` the recorder only records locally. An invalid
    /// `[endpoint]` section also leaves sync disabled, and each sync reports
    /// [`SkipReason::InvalidEndpoint`].
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let queue = DurableQueue::from_config(&config.queue);

        if !config.endpoint.is_ready() {
            return Ok(Self::new(queue, None, Gate::Never(Offline)));
        }

        match sync_stack(config) {
            Ok((engine, gate)) => Ok(Self::new(queue, Some(engine), gate)),
            Err(e) => {
                tracing::warn!(error = %e, "Endpoint misconfigured, recording locally only");
                let mut recorder = Self::new(queue, None, Gate::Never(Offline));
                recorder.endpoint_error = Some(e.to_string());
                Ok(recorder)
            }
        }
    }
}

fn sync_stack(config: &Config) -> Result<(SyncEngine<HttpTransport>, Gate)> {
    let transport = HttpTransport::from_config(&config.endpoint)?;
    let engine = SyncEngine::from_config(transport, &config.endpoint)?;
    let gate = Gate::from_config(&config.connectivity, config.endpoint.url.as_deref())?;
    Ok((engine, gate))
}

impl<T: Transport, G: ConnectivityGate> Recorder<T, G> {
    pub fn new(queue: DurableQueue, engine: Option<SyncEngine<T>>, gate: G) -> Self {
        Self {
            queue,
            engine,
            gate,
            status: Box::new(NoStatus),
            endpoint_error: None,
        }
    }

    /// Notify `status` when an upload starts
    pub fn with_status(mut self, status: impl StatusSink + 'static) -> Self {
        self.status = Box::new(status);
        self
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn engine(&self) -> Option<&SyncEngine<T>> {
        self.engine.as_ref()
    }

    /// Record `category` at the current local time, then try to sync.
    pub async fn record(&self, category: &str) -> Result<CaptureReport> {
        self.record_at(Local::now().naive_local(), category).await
    }

    /// Record `category` at `timestamp`, then try to sync.
    ///
    /// Fails only if the record could not be committed. Sync problems are
    /// reported in [`CaptureReport::sync`].
    pub async fn record_at(&self, timestamp: NaiveDateTime, category: &str) -> Result<CaptureReport> {
        let record = Record::at(timestamp, category);
        self.queue.append(&record)?;
        tracing::info!(
            date = %record.date(),
            time = %record.time(),
            category = %record.category(),
            "Recorded mood"
        );

        let sync = self.sync().await;
        Ok(CaptureReport { record, sync })
    }

    /// Drain the queue if an endpoint is configured and the gate allows it.
    pub async fn sync(&self) -> SyncStatus {
        let Some(engine) = &self.engine else {
            let reason = match &self.endpoint_error {
                Some(error) => SkipReason::InvalidEndpoint(error.clone()),
                None => SkipReason::NoEndpoint,
            };
            return SyncStatus::Skipped(reason);
        };

        if !self.gate.connect().await {
            return SyncStatus::Skipped(SkipReason::Offline);
        }

        match engine.drain_with_status(&self.queue, self.status.as_ref()).await {
            Ok(result) => SyncStatus::Completed(result),
            Err(e) => {
                tracing::error!(error = %e, "Sync failed");
                SyncStatus::Failed(e)
            }
        }
    }
}
