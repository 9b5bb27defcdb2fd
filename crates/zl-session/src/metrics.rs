//! Keystroke latency metrics
//!
//! Times the round trip from a keystroke leaving the terminal to the next
//! output arriving. Inputs and outputs must alternate; each matched pair
//! becomes one [`LatencySample`] that is reported on a background task so
//! the session's data path never waits on telemetry.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use zl_core::time::current_time_millis;
use zl_protocol::ConnectionId;

/// Metrics state machine violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("Keypress metrics was not expecting an input")]
    UnexpectedInput,

    #[error("Keypress metrics was not expecting an output")]
    UnexpectedOutput,

    #[error("Failed to report latency sample: {0}")]
    Report(String),
}

/// One input-to-output round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub sequence_number: u64,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub delta_ms: u64,
}

/// Destination for latency samples
#[async_trait]
pub trait LatencyReporter: Send + Sync {
    async fn report(
        &self,
        connection_id: &ConnectionId,
        sample: LatencySample,
    ) -> Result<(), MetricsError>;
}

/// Logs samples at debug level
#[derive(Debug, Default)]
pub struct TracingReporter;

#[async_trait]
impl LatencyReporter for TracingReporter {
    async fn report(
        &self,
        connection_id: &ConnectionId,
        sample: LatencySample,
    ) -> Result<(), MetricsError> {
        tracing::debug!(
            connection_id = %connection_id,
            sequence_number = sample.sequence_number,
            delta_ms = sample.delta_ms,
            "Keystroke latency"
        );
        Ok(())
    }
}

/// Wire body for `post-latency-metrics-v1`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LatencyV1Request<'a> {
    start_time: u64,
    end_time: u64,
    delta_ms: u64,
    connection_id: &'a str,
    sequence_number: u64,
    service: &'static str,
    description: &'static str,
}

/// Posts samples to the connection node's metrics endpoint
#[derive(Debug, Clone)]
pub struct HttpLatencyReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLatencyReporter {
    /// `base_url` is the connection node URL; the metrics path is appended
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/metrics/post-latency-metrics-v1",
                base_url.trim_end_matches('/')
            ),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LatencyReporter for HttpLatencyReporter {
    async fn report(
        &self,
        connection_id: &ConnectionId,
        sample: LatencySample,
    ) -> Result<(), MetricsError> {
        let body = LatencyV1Request {
            start_time: sample.start_time_ms,
            end_time: sample.end_time_ms,
            delta_ms: sample.delta_ms,
            connection_id: connection_id.as_str(),
            sequence_number: sample.sequence_number,
            service: "zli",
            description: "metrics gathered at the zli",
        };
        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| MetricsError::Report(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    sequence_number: u64,
    started: bool,
    input_received_ms: Option<u64>,
}

/// Per-session latency tracker
pub struct LatencyMetrics {
    connection_id: ConnectionId,
    reporter: Arc<dyn LatencyReporter>,
    state: Mutex<MetricsState>,
}

impl LatencyMetrics {
    pub fn new(connection_id: ConnectionId, reporter: Arc<dyn LatencyReporter>) -> Self {
        Self {
            connection_id,
            reporter,
            state: Mutex::new(MetricsState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A keystroke was sent
    pub fn new_input_received(&self) -> Result<(), MetricsError> {
        let mut state = self.lock();
        if state.input_received_ms.is_some() {
            return Err(MetricsError::UnexpectedInput);
        }
        state.input_received_ms = Some(current_time_millis());
        state.started = true;
        Ok(())
    }

    /// Output arrived; returns the sample it completed, if any
    ///
    /// Output before the first input is ignored.
    pub fn new_output_received(&self) -> Result<Option<LatencySample>, MetricsError> {
        let sample = {
            let mut state = self.lock();
            if !state.started {
                return Ok(None);
            }
            let start = state
                .input_received_ms
                .take()
                .ok_or(MetricsError::UnexpectedOutput)?;
            let end = current_time_millis();
            let sample = LatencySample {
                sequence_number: state.sequence_number,
                start_time_ms: start,
                end_time_ms: end,
                delta_ms: end.saturating_sub(start),
            };
            state.sequence_number += 1;
            sample
        };

        let reporter = self.reporter.clone();
        let connection_id = self.connection_id.clone();
        tokio::spawn(async move {
            if let Err(e) = reporter.report(&connection_id, sample).await {
                tracing::debug!("Dropping latency sample: {}", e);
            }
        });
        Ok(Some(sample))
    }
}
