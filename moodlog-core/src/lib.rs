//! # moodlog-core
//!
//! Core library for moodlog - an offline-first mood recorder.
//!
//! This library provides:
//! - Record encoding for the queue file and the collector query string
//! - A durable, append-only local queue
//! - A sync engine that drains the queue to a remote collector
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use moodlog_core::{Config, Recorder};
//!
//! # async fn run() -> moodlog_core::Result<()> {
//! let config = Config::load()?;
//! let recorder = Recorder::from_config(&config)?;
//!
//! let report = recorder.record("Happy :D").await?;
//! println!("saved {:?}, sync: {:?}", report.record, report.sync);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use queue::{DurableQueue, Snapshot};
pub use record::{encode, resolve_mood, Record, DEFAULT_MOODS};
pub use recorder::{CaptureReport, Recorder, SkipReason, SyncStatus};
pub use sync::{Outcome, SyncEngine, SyncResult};

// Public modules
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod record;
pub mod recorder;
pub mod sync;
