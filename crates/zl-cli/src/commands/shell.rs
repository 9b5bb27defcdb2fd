//! Shell command implementation
//!
//! Attaches the local terminal to a remote shell connection through the
//! connection bridge. With a terminal on stdin, keys are read in raw mode
//! and resizes are forwarded; otherwise stdin is streamed as-is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use crossterm::event::{self, Event};
use crossterm::tty::IsTty;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use zl_protocol::{ConnectionId, TerminalSize};
use zl_session::{
    BridgeTransport, HttpLatencyReporter, LatencyMetrics, LatencyReporter, SessionController,
    SessionOutcome, TracingReporter,
};

use crate::context::CliContext;
use crate::output::{print_error, print_notice};
use crate::terminal::{current_size, is_detach_key, key_to_bytes, RawModeGuard, StdoutSink};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn latency_metrics(
    ctx: &CliContext,
    connection_id: &ConnectionId,
) -> Result<Option<Arc<LatencyMetrics>>> {
    let session = &ctx.config.session;
    if !session.metrics_enabled {
        return Ok(None);
    }

    let reporter: Arc<dyn LatencyReporter> = match &session.metrics_url {
        Some(url) => {
            let client = reqwest::Client::builder()
                .build()
                .context("Failed to build metrics client")?;
            Arc::new(HttpLatencyReporter::new(client, url))
        }
        None => Arc::new(TracingReporter),
    };
    Ok(Some(Arc::new(LatencyMetrics::new(
        connection_id.clone(),
        reporter,
    ))))
}

/// Execute the shell command
pub async fn shell_command(ctx: &CliContext, connection_id: &str) -> Result<u8> {
    let connection_id = ConnectionId::from(connection_id);
    let transport = Arc::new(BridgeTransport::new(
        ctx.config.session.bridge_address.clone(),
    ));
    let controller = SessionController::new(
        connection_id.clone(),
        transport,
        Arc::new(StdoutSink),
        ctx.config.session.batch.clone(),
        latency_metrics(ctx, &connection_id)?,
    );

    let interactive = std::io::stdin().is_tty();
    if let Err(e) = controller.start(current_size()).await {
        print_error(&e.to_string());
        return Ok(1);
    }

    let outcome = if interactive {
        print_notice("Attached. Press Ctrl+] to detach.");
        run_interactive(&controller).await?
    } else {
        run_piped(&controller).await
    };

    if let SessionOutcome::Failed(e) = &outcome {
        print_error(&e.to_string());
    }
    Ok(outcome.exit_code() as u8)
}

async fn run_interactive(controller: &SessionController) -> Result<SessionOutcome> {
    let _raw = RawModeGuard::enable().context("Failed to enable raw terminal mode")?;

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::Relaxed) {
                match event::poll(EVENT_POLL_INTERVAL) {
                    Ok(true) => match event::read() {
                        Ok(evt) => {
                            if event_tx.blocking_send(evt).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!("Terminal read failed: {}", e);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        tracing::debug!("Terminal poll failed: {}", e);
                        break;
                    }
                }
            }
        })
    };

    let outcome = loop {
        tokio::select! {
            outcome = controller.closed() => break outcome,
            Some(evt) = event_rx.recv() => handle_event(controller, evt),
        }
    };

    stop.store(true, Ordering::Relaxed);
    let _ = reader.await;
    Ok(outcome)
}

fn handle_event(controller: &SessionController, evt: Event) {
    match evt {
        Event::Key(key) if is_detach_key(&key) => controller.dispose(),
        Event::Key(key) => {
            let bytes = key_to_bytes(&key);
            if !bytes.is_empty() {
                controller.write_input(bytes);
            }
        }
        Event::Paste(text) => controller.write_input(Bytes::from(text)),
        Event::Resize(cols, rows) => controller.resize(TerminalSize::new(rows, cols)),
        _ => {}
    }
}

async fn run_piped(controller: &SessionController) -> SessionOutcome {
    let input = {
        let controller = controller.clone();
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = vec![0u8; 4096];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => controller.write_input(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) => {
                        tracing::debug!("Reading stdin failed: {}", e);
                        break;
                    }
                }
            }
        })
    };

    let outcome = tokio::select! {
        outcome = controller.closed() => outcome,
        Ok(()) = tokio::signal::ctrl_c() => {
            controller.dispose();
            controller.closed().await
        }
    };
    input.abort();
    outcome
}
