//! Adaptive keyboard input batching
//!
//! Single keystrokes should reach the remote shell almost immediately, but a
//! paste arrives as a burst of many chunks in the same instant and sending
//! each one separately is wasteful. The batcher keeps an adaptive delay:
//! every chunk that follows the previous one within the burst threshold
//! grows the delay (up to a cap), anything slower resets it. Each chunk
//! re-arms a single flush timer for the current delay, but never past
//! `max_delay` after the first chunk of the pending batch, so a steady
//! stream of input still flushes at least that often.

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use zl_core::config::InputBatchConfig;

/// Resettable delay that grows during input bursts
#[derive(Debug, Clone)]
pub struct AdaptiveDelay {
    min: Duration,
    burst_threshold: Duration,
    step: Duration,
    max: Duration,
    current: Duration,
    last_input: Option<Instant>,
}

impl AdaptiveDelay {
    /// Create from configuration
    pub fn from_config(config: &InputBatchConfig) -> Self {
        Self::new(
            config.min_delay,
            config.burst_threshold,
            config.delay_step,
            config.max_delay,
        )
    }

    pub fn new(min: Duration, burst_threshold: Duration, step: Duration, max: Duration) -> Self {
        Self {
            min,
            burst_threshold,
            step,
            max,
            current: min,
            last_input: None,
        }
    }

    /// Record an input at `now` and return the delay to arm the flush timer with
    pub fn on_input(&mut self, now: Instant) -> Duration {
        let burst = self
            .last_input
            .is_some_and(|last| now.saturating_duration_since(last) < self.burst_threshold);

        self.current = if burst {
            std::cmp::min(self.current + self.step, self.max)
        } else {
            self.min
        };
        self.last_input = Some(now);
        self.current
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Back to the initial state
    pub fn reset(&mut self) {
        self.current = self.min;
        self.last_input = None;
    }
}

/// Join pending chunks into writes of at most `max_chunks` chunks each
pub fn join_pieces(chunks: &[Bytes], max_chunks: usize) -> Vec<Bytes> {
    chunks
        .chunks(max_chunks.max(1))
        .map(|piece| {
            let mut buf = BytesMut::with_capacity(piece.iter().map(Bytes::len).sum());
            for chunk in piece {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        })
        .collect()
}

/// Background task that coalesces input chunks into writes
///
/// Dropping the batcher (or calling [`InputBatcher::shutdown`]) flushes
/// nothing further: pending input of a finished session is discarded.
#[derive(Debug)]
pub struct InputBatcher {
    tx: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

impl InputBatcher {
    /// Spawn the batching task; `flush` is awaited for every write
    pub fn spawn<F, Fut>(config: &InputBatchConfig, mut flush: F) -> Self
    where
        F: FnMut(Bytes) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let mut delay = AdaptiveDelay::from_config(config);
        let max_chunks = config.max_chunks_per_write;
        let max_delay = config.max_delay;

        let task = tokio::spawn(async move {
            let mut pending: Vec<Bytes> = Vec::new();
            let timer = tokio::time::sleep(Duration::ZERO);
            tokio::pin!(timer);
            // Latest flush time for the pending batch; set while armed
            let mut flush_by: Option<Instant> = None;

            loop {
                tokio::select! {
                    chunk = rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        let now = Instant::now();
                        let wait = delay.on_input(now);
                        pending.push(chunk);
                        let limit = *flush_by.get_or_insert(now + max_delay);
                        timer.as_mut().reset(std::cmp::min(now + wait, limit));
                    }
                    _ = &mut timer, if flush_by.is_some() => {
                        flush_by = None;
                        let batch = std::mem::take(&mut pending);
                        tracing::trace!(chunks = batch.len(), "Flushing input batch");
                        for piece in join_pieces(&batch, max_chunks) {
                            flush(piece).await;
                        }
                    }
                }
            }
        });

        Self { tx, task }
    }

    /// Queue a chunk. Returns `false` once the batcher has stopped.
    pub fn push(&self, chunk: Bytes) -> bool {
        self.tx.send(chunk).is_ok()
    }

    /// Stop the batching task
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for InputBatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_batcher(config: &InputBatchConfig) -> (InputBatcher, Arc<Mutex<Vec<Bytes>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let sink = writes.clone();
        let batcher = InputBatcher::spawn(config, move |piece| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(piece);
            }
        });
        (batcher, writes)
    }

    #[test]
    fn test_delay_grows_during_burst_and_caps() {
        let config = InputBatchConfig::default();
        let mut delay = AdaptiveDelay::from_config(&config);
        let start = Instant::now();

        assert_eq!(delay.on_input(start), Duration::from_millis(1));
        assert_eq!(delay.on_input(start), Duration::from_millis(6));
        assert_eq!(delay.on_input(start + Duration::from_millis(2)), Duration::from_millis(11));

        for _ in 0..50 {
            delay.on_input(start + Duration::from_millis(2));
        }
        assert_eq!(delay.current(), Duration::from_millis(101));
    }

    #[test]
    fn test_slow_input_resets_delay() {
        let mut delay = AdaptiveDelay::from_config(&InputBatchConfig::default());
        let start = Instant::now();
        delay.on_input(start);
        delay.on_input(start);
        assert_eq!(delay.current(), Duration::from_millis(6));

        assert_eq!(
            delay.on_input(start + Duration::from_millis(5)),
            Duration::from_millis(1)
        );

        delay.on_input(start + Duration::from_millis(6));
        delay.reset();
        assert_eq!(delay.current(), Duration::from_millis(1));
    }

    #[test]
    fn test_join_pieces_respects_limit() {
        let chunks: Vec<Bytes> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| Bytes::from_static(s.as_bytes()))
            .collect();
        let pieces = join_pieces(&chunks, 2);
        assert_eq!(pieces, vec!["ab", "cd", "e"]);
        assert!(join_pieces(&[], 2).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_one_write() {
        let (batcher, writes) = recording_batcher(&InputBatchConfig::default());
        for key in ["a", "b", "c"] {
            assert!(batcher.push(Bytes::from_static(key.as_bytes())));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*writes.lock().unwrap(), vec![Bytes::from_static(b"abc")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_keys_are_separate_writes() {
        let (batcher, writes) = recording_batcher(&InputBatchConfig::default());
        for key in ["a", "b", "c"] {
            batcher.push(Bytes::from_static(key.as_bytes()));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            *writes.lock().unwrap(),
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c")
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_stream_flushes_within_max_delay() {
        let config = InputBatchConfig::default();
        let (batcher, writes) = recording_batcher(&config);

        // One chunk every 2ms for 2s never leaves a gap longer than the delay
        for _ in 0..1000 {
            batcher.push(Bytes::from_static(b"x"));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let flushed_during_stream = writes.lock().unwrap().len();
        assert!(
            flushed_during_stream >= 15,
            "only {flushed_during_stream} writes during the stream"
        );

        tokio::time::sleep(config.max_delay * 2).await;
        let total: usize = writes.lock().unwrap().iter().map(Bytes::len).sum();
        assert_eq!(total, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_paste_is_split() {
        let config = InputBatchConfig {
            max_chunks_per_write: 4,
            ..Default::default()
        };
        let (batcher, writes) = recording_batcher(&config);
        for _ in 0..10 {
            batcher.push(Bytes::from_static(b"x"));
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        let lens: Vec<usize> = writes.lock().unwrap().iter().map(Bytes::len).collect();
        assert_eq!(lens, vec![4, 4, 2]);
    }
}
