//! Pipeline instance identities.
//!
//! A single background task pre-generates a bounded number of short labels;
//! each engine construction consumes exactly one. The labels are used only
//! for log and metric correlation, but they are still guaranteed unique
//! within the process (sequential counter, no random sampling).

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Bounded pool of unique pipeline identities fed by one generator task.
pub struct IdentityPool {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl IdentityPool {
    /// Spawn the generator task. At most `capacity` identities will ever be
    /// handed out; the generator exits once they are consumed.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.clamp(1, 16));

        tokio::spawn(async move {
            for n in 0..capacity {
                if tx.send(format!("p_{n}")).await.is_err() {
                    break;
                }
            }
            debug!(capacity, "Identity generator finished");
        });

        Self { rx: Mutex::new(rx) }
    }

    /// Take the next identity, waiting until one is available. Returns
    /// `None` once the pool capacity has been exhausted.
    pub async fn acquire(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}
