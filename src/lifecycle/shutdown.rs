//! Shutdown coordination for the gateway.
//!
//! The HTTP server, its reload loop and test harnesses each hold a receiver.
//! Triggering twice is harmless.

use tokio::sync::broadcast;

/// Broadcasts one stop signal to every subscribed gateway task.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Returns how many tasks were listening.
    pub fn trigger(&self) -> usize {
        match self.tx.send(()) {
            Ok(listening) => {
                tracing::info!(tasks = listening, "Gateway shutdown signalled");
                listening
            }
            Err(_) => {
                tracing::debug!("Gateway shutdown signalled with no tasks listening");
                0
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
