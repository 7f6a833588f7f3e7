//! Remote sync for queued records
//!
//! ## Architecture
//!
//! Recording follows a "local-first" principle:
//! - A record is always committed to the local queue first
//! - Syncing happens only when the connectivity gate reports the endpoint reachable
//! - Network failures never block or undo local recording
//!
//! ## Protocol
//!
//! Each record is delivered with one GET to the configured endpoint:
//!
//! ```text
//! GET <url>?date=2024-01-01&time=09%3A00%3A00&mood=Happy%20%3AD
//! ```
//!
//! A redirect is followed for exactly one hop. The final response must be
//! `200` with the success marker in its body.

mod connectivity;
mod engine;
mod transport;

pub use connectivity::{AlwaysOnline, ConnectivityGate, Gate, Offline, TcpProbe};
pub use engine::{classify, NoStatus, Outcome, StatusSink, SyncEngine, SyncResult};
pub use transport::{HttpTransport, Response, Transport, TransportError};
