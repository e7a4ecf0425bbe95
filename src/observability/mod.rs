//! Observability module
//!
//! Logging, metrics and structured event infrastructure for monitoring the
//! controller while it drives the rig.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter, StopReason};
pub use logging::{LogFormat, LogSettings};
pub use metrics::init_metrics;
