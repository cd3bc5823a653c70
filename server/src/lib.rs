//! Draw settlement service.
//!
//! Wires the pure settlement pipeline of `lotto-execution` to SQLite storage, a per-draw
//! lock, a 15-minute scheduler and an HTTP API.

mod api;
pub use api::Api;

pub mod config;
pub use config::{ConfigError, LocalClock, ServerConfig};

mod lock;
pub use lock::{DrawLock, DrawLockGuard};

mod metrics;
pub use metrics::{DrawMetrics, DrawMetricsSnapshot, LatencySnapshot};

pub mod scheduler;

mod service;
pub use service::{DrawError, DrawOutcome, DrawRequest, DrawService};

mod store;
pub use store::{DrawStore, NewTicket, SaveOutcome};
