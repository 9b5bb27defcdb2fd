//! zl-session: Interactive shell sessions
//!
//! A [`SessionController`] drives one terminal session bound to a remote
//! connection id. It consumes lifecycle events and output from a
//! [`ShellTransport`], forwards batched keyboard input and resizes, and
//! reports a single [`SessionOutcome`] when the session ends.

pub mod batcher;
pub mod bridge;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod subject;

pub use batcher::{AdaptiveDelay, InputBatcher};
pub use bridge::BridgeTransport;
pub use controller::{
    OutputSink, SessionController, SessionOutcome, SessionPhase, ShellTransport, TransportLink,
};
pub use error::SessionError;
pub use metrics::{
    HttpLatencyReporter, LatencyMetrics, LatencyReporter, LatencySample, MetricsError,
    TracingReporter,
};
pub use subject::{Subject, Terminal};
