//! Publish/subscribe channel with an explicit terminal signal
//!
//! Values fan out over a broadcast channel. The terminal signal (complete or
//! error) lives in a watch channel so late subscribers still observe it, and
//! it can be set only once.

use tokio::sync::{broadcast, watch};

/// How a [`Subject`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal<E> {
    Completed,
    Errored(E),
}

/// One producer, many consumers, with a once-only terminal signal
#[derive(Debug)]
pub struct Subject<T, E> {
    values: broadcast::Sender<T>,
    terminal: watch::Sender<Option<Terminal<E>>>,
}

impl<T: Clone, E: Clone> Subject<T, E> {
    pub fn new(capacity: usize) -> Self {
        let (values, _) = broadcast::channel(capacity);
        let (terminal, _) = watch::channel(None);
        Self { values, terminal }
    }

    /// Publish a value; ignored once the subject has terminated
    pub fn next(&self, value: T) {
        if self.is_closed() {
            return;
        }
        // No subscribers is fine
        let _ = self.values.send(value);
    }

    /// Complete the subject. Returns `false` if it had already terminated.
    pub fn complete(&self) -> bool {
        self.terminate(Terminal::Completed)
    }

    /// Fail the subject. Returns `false` if it had already terminated.
    pub fn error(&self, error: E) -> bool {
        self.terminate(Terminal::Errored(error))
    }

    fn terminate(&self, signal: Terminal<E>) -> bool {
        self.terminal.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(signal);
            true
        })
    }

    pub fn is_closed(&self) -> bool {
        self.terminal.borrow().is_some()
    }

    /// Receive values published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.values.subscribe()
    }

    /// Wait for the terminal signal
    pub async fn closed(&self) -> Terminal<E> {
        let mut rx = self.terminal.subscribe();
        let signal = match rx.wait_for(Option::is_some).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so it cannot be dropped here
            Err(_) => None,
        };
        signal.unwrap_or(Terminal::Completed)
    }
}
