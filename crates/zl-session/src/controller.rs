//! Session controller
//!
//! Drives one interactive terminal session bound to a connection id.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting --Start--> Running --BrokenSocket--> BrokenSocket --Start--> Running
//!      |                   |
//!      +-------------------+--Unattached/Disconnect/Delete/error--> Terminated
//! ```
//!
//! Input is only forwarded while `Running`. Every way a session can end
//! (terminal event, transport failure, interrupt, local dispose) goes
//! through a single teardown path that records the outcome once.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use zl_core::config::InputBatchConfig;
use zl_protocol::message::decode_output;
use zl_protocol::{ConnectionId, InboundFrame, OutboundFrame, ShellEvent, TerminalSize};

use crate::batcher::InputBatcher;
use crate::error::SessionError;
use crate::metrics::LatencyMetrics;
use crate::subject::Subject;

/// Interrupt (Ctrl-C)
const ETX: u8 = 0x03;

/// Duplex link to a remote shell connection
#[derive(Debug)]
pub struct TransportLink {
    /// Lifecycle events, output and errors from the remote side
    pub inbound: mpsc::Receiver<InboundFrame>,
    /// Input, resizes and close requests to the remote side
    pub outbound: mpsc::Sender<OutboundFrame>,
}

/// Opens shell connections
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// Open (or re-attach to) the connection with the given id
    async fn open(&self, connection_id: &ConnectionId) -> Result<TransportLink, SessionError>;
}

/// Where decoded terminal output goes
pub trait OutputSink: Send + Sync {
    fn write(&self, data: &[u8]);
}

impl<F> OutputSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn write(&self, data: &[u8]) {
        self(data)
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Running,
    Unattached,
    Disconnected,
    Deleted,
    BrokenSocket,
    Terminated,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Another client attached to the connection
    Unattached,
    /// Disposed locally
    Disposed,
    /// Any other termination
    Failed(SessionError),
}

impl SessionOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Unattached | SessionOutcome::Disposed => 0,
            SessionOutcome::Failed(_) => 1,
        }
    }
}

struct State {
    phase: SessionPhase,
    size: TerminalSize,
    started: bool,
    announced: bool,
    outcome: Option<SessionOutcome>,
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    batcher: Option<InputBatcher>,
}

struct Inner {
    connection_id: ConnectionId,
    batch: InputBatchConfig,
    state: Mutex<State>,
    phases: Subject<SessionPhase, SessionError>,
    cancel: CancellationToken,
    sink: Arc<dyn OutputSink>,
    metrics: Option<Arc<LatencyMetrics>>,
}

/// Controller for one interactive session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
    transport: Arc<dyn ShellTransport>,
}

impl SessionController {
    pub fn new(
        connection_id: ConnectionId,
        transport: Arc<dyn ShellTransport>,
        sink: Arc<dyn OutputSink>,
        batch: InputBatchConfig,
        metrics: Option<Arc<LatencyMetrics>>,
    ) -> Self {
        let inner = Inner {
            connection_id,
            batch,
            state: Mutex::new(State {
                phase: SessionPhase::Connecting,
                size: TerminalSize::default(),
                started: false,
                announced: false,
                outcome: None,
                outbound: None,
                batcher: None,
            }),
            phases: Subject::new(16),
            cancel: CancellationToken::new(),
            sink,
            metrics,
        };
        Self {
            inner: Arc::new(inner),
            transport,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.inner.connection_id
    }

    /// Open the transport and start consuming its events
    ///
    /// Returns once the transport is open. Events arriving from then on
    /// are processed by a background task.
    pub async fn start(&self, size: TerminalSize) -> Result<(), SessionError> {
        {
            let mut state = self.inner.lock();
            if state.started {
                return Err(SessionError::AlreadyStarted);
            }
            state.started = true;
            state.size = size;
        }

        debug!(connection_id = %self.inner.connection_id, "Opening shell transport");
        let link = match self.transport.open(&self.inner.connection_id).await {
            Ok(link) => link,
            Err(e) => {
                self.inner.finish(SessionOutcome::Failed(e.clone()));
                return Err(e);
            }
        };

        let tx = link.outbound.clone();
        let batcher = InputBatcher::spawn(&self.inner.batch, move |piece: Bytes| {
            let tx = tx.clone();
            async move {
                if tx.send(OutboundFrame::input(&piece)).await.is_err() {
                    debug!("Transport closed, dropping {} bytes of input", piece.len());
                }
            }
        });

        {
            let mut state = self.inner.lock();
            if state.outcome.is_some() {
                // Disposed while the transport was opening
                let _ = link.outbound.try_send(OutboundFrame::Close);
                return Ok(());
            }
            state.outbound = Some(link.outbound);
            state.batcher = Some(batcher);
        }

        tokio::spawn(pump(self.inner.clone(), link.inbound));
        Ok(())
    }

    /// Record a new terminal size, forwarding it while running
    pub fn resize(&self, size: TerminalSize) {
        let tx = {
            let mut state = self.inner.lock();
            state.size = size;
            if state.phase != SessionPhase::Running {
                return;
            }
            state.outbound.clone()
        };
        if let Some(tx) = tx {
            if tx.try_send(OutboundFrame::Resize { size }).is_err() {
                debug!("Resize not delivered, transport busy or closed");
            }
        }
    }

    /// Forward keyboard input
    ///
    /// Input is dropped while the session is not running, except that an
    /// interrupt terminates a session that never became usable.
    pub fn write_input(&self, chunk: Bytes) {
        let state = self.inner.lock();
        match state.phase {
            SessionPhase::Running => {
                if let Some(batcher) = &state.batcher {
                    batcher.push(chunk);
                }
                drop(state);
                if let Some(metrics) = &self.inner.metrics {
                    if let Err(e) = metrics.new_input_received() {
                        trace!("{}", e);
                    }
                }
            }
            SessionPhase::Terminated => {}
            _ => {
                drop(state);
                if chunk.first() == Some(&ETX) {
                    self.inner
                        .finish(SessionOutcome::Failed(SessionError::Killed));
                } else {
                    trace!(bytes = chunk.len(), "Input blocked, dropping");
                }
            }
        }
    }

    /// End the session locally
    ///
    /// The remote connection stays open. Calling this more than once, or
    /// after the session already ended, has no effect.
    pub fn dispose(&self) {
        self.inner.finish(SessionOutcome::Disposed);
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase
    }

    /// Phase transitions from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionPhase> {
        self.inner.phases.subscribe()
    }

    /// Wait for the session to end
    pub async fn closed(&self) -> SessionOutcome {
        self.inner.phases.closed().await;
        self.inner
            .lock()
            .outcome
            .clone()
            .unwrap_or(SessionOutcome::Disposed)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `phase` unless the session has ended; returns false if it has
    fn transition(&self, phase: SessionPhase) -> bool {
        {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.phase = phase;
        }
        self.phases.next(phase);
        true
    }

    async fn on_start(&self) {
        let (tx, size, first) = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return;
            }
            state.phase = SessionPhase::Running;
            let first = !state.announced;
            state.announced = true;
            (state.outbound.clone(), state.size, first)
        };

        if let Some(tx) = tx {
            let _ = tx.send(OutboundFrame::Resize { size }).await;
        }

        if first {
            info!(connection_id = %self.connection_id, "Shell session running");
            self.phases.next(SessionPhase::Running);
        } else {
            info!(connection_id = %self.connection_id, "Shell session resumed");
        }
    }

    fn on_output(&self, data: &str) {
        let bytes = match decode_output(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping malformed output frame: {}", e);
                return;
            }
        };
        self.sink.write(&bytes);
        if let Some(metrics) = &self.metrics {
            if let Err(e) = metrics.new_output_received() {
                trace!("{}", e);
            }
        }
    }

    /// Handle one inbound frame; returns false once the session has ended
    async fn handle_frame(&self, frame: InboundFrame) -> bool {
        match frame {
            InboundFrame::Event { event } => {
                debug!(?event, "Shell event");
                match event {
                    ShellEvent::Start => self.on_start().await,
                    ShellEvent::BrokenSocket => {
                        if self.transition(SessionPhase::BrokenSocket) {
                            warn!("Reconnecting...");
                        }
                    }
                    ShellEvent::Unattached => {
                        warn!("Another client has attached to this connection.");
                        self.transition(SessionPhase::Unattached);
                        self.finish(SessionOutcome::Unattached);
                    }
                    ShellEvent::Disconnect => {
                        self.transition(SessionPhase::Disconnected);
                        self.finish(SessionOutcome::Failed(SessionError::TargetDisconnected));
                    }
                    ShellEvent::Delete => {
                        self.transition(SessionPhase::Deleted);
                        self.finish(SessionOutcome::Failed(SessionError::ConnectionClosed));
                    }
                }
            }
            InboundFrame::Output { data } => self.on_output(&data),
            InboundFrame::Error { message } => {
                self.finish(SessionOutcome::Failed(SessionError::Transport(message)));
            }
        }
        !self.cancel.is_cancelled()
    }

    /// Single teardown path. Returns false if the session had already ended.
    fn finish(&self, outcome: SessionOutcome) -> bool {
        let (outbound, batcher) = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            state.phase = SessionPhase::Terminated;
            (state.outbound.take(), state.batcher.take())
        };

        self.cancel.cancel();
        if let Some(batcher) = batcher {
            batcher.shutdown();
        }
        if let Some(tx) = outbound {
            let _ = tx.try_send(OutboundFrame::Close);
        }

        debug!(connection_id = %self.connection_id, ?outcome, "Session finished");
        self.phases.next(SessionPhase::Terminated);
        match outcome {
            SessionOutcome::Failed(e) => self.phases.error(e),
            _ => self.phases.complete(),
        };
        true
    }
}

async fn pump(inner: Arc<Inner>, mut inbound: mpsc::Receiver<InboundFrame>) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return,
            frame = inbound.recv() => frame,
        };

        match frame {
            Some(frame) => {
                if !inner.handle_frame(frame).await {
                    return;
                }
            }
            None => {
                inner.finish(SessionOutcome::Failed(SessionError::Transport(
                    "event stream ended".to_string(),
                )));
                return;
            }
        }
    }
}
