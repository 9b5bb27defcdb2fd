//! JSON-lines shell transport
//!
//! Talks to a local connection bridge over TCP. Each line is one JSON
//! frame; the first line sent is `open` with the connection id, after which
//! the bridge streams inbound frames and accepts outbound ones.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

use zl_protocol::{ConnectionId, InboundFrame, OutboundFrame};

use crate::controller::{ShellTransport, TransportLink};
use crate::error::SessionError;

/// Longest inbound line accepted (output frames carry base64 payloads)
const MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;

/// Buffered frames per direction
const CHANNEL_CAPACITY: usize = 256;

/// Transport backed by a TCP connection bridge
#[derive(Debug, Clone)]
pub struct BridgeTransport {
    address: String,
}

impl BridgeTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ShellTransport for BridgeTransport {
    async fn open(&self, connection_id: &ConnectionId) -> Result<TransportLink, SessionError> {
        let open_error = |reason: String| SessionError::Open {
            connection_id: connection_id.to_string(),
            reason,
        };

        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| open_error(format!("cannot reach bridge at {}: {}", self.address, e)))?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();

        let mut reader = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        );
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let open = OutboundFrame::Open {
            connection_id: connection_id.clone(),
        };
        let line = open.to_json().map_err(|e| open_error(e.to_string()))?;
        writer
            .send(line)
            .await
            .map_err(|e| open_error(e.to_string()))?;
        debug!(connection_id = %connection_id, address = %self.address, "Bridge connection opened");

        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(line) = reader.next().await {
                let frame = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => match InboundFrame::from_json(&line) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Ignoring bad frame from bridge: {}", e);
                            continue;
                        }
                    },
                    Err(e) => {
                        let _ = inbound_tx
                            .send(InboundFrame::Error {
                                message: format!("bridge read failed: {}", e),
                            })
                            .await;
                        break;
                    }
                };
                if inbound_tx.send(frame).await.is_err() {
                    break;
                }
            }
            debug!("Bridge reader finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = frame == OutboundFrame::Close;
                let line = match frame.to_json() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Cannot encode frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = writer.send(line).await {
                    debug!("Bridge write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = SinkExt::<String>::close(&mut writer).await;
            debug!("Bridge writer finished");
        });

        Ok(TransportLink {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}
