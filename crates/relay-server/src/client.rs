//! Per-connection client state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{ClientId, Message};
use tokio::sync::mpsc;

use crate::hub::HubHandle;

/// A connected client as the hub sees it.
///
/// Holds the sending half of the client's bounded outbound queue. The
/// receiving half is drained exclusively by that client's outbound pump.
/// The hub reference is non-owning: it is only used to post onto the
/// hub's intake channels.
pub struct Client {
    /// Unique identity token.
    pub id: ClientId,
    /// Display name; at most one registered client per name.
    pub username: String,
    hub: HubHandle,
    /// `None` once closed. The `Option` is the double-close guard: the
    /// first `close_outbound` drops the sender, later calls are no-ops.
    outbound: Mutex<Option<mpsc::Sender<Arc<Message>>>>,
    /// Last time the peer acknowledged a keepalive (or sent anything).
    last_pong: Mutex<Instant>,
}

impl Client {
    /// Create a client around an outbound queue sender.
    pub fn new(username: impl Into<String>, hub: HubHandle, outbound: mpsc::Sender<Arc<Message>>) -> Self {
        Self {
            id: ClientId::new(),
            username: username.into(),
            hub,
            outbound: Mutex::new(Some(outbound)),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    /// The hub this client is registered with.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Enqueue a message onto the outbound queue, waiting at most `wait`
    /// for capacity.
    ///
    /// Returns `false` if the queue is closed or the wait is exhausted —
    /// the caller treats that as a dead or stalled consumer.
    pub async fn enqueue(&self, message: Arc<Message>, wait: Duration) -> bool {
        let Some(tx) = self.outbound.lock().clone() else {
            return false;
        };
        matches!(
            tokio::time::timeout(wait, tx.send(message)).await,
            Ok(Ok(()))
        )
    }

    /// Close the outbound queue. Idempotent.
    ///
    /// The outbound pump observes the closed queue as `None` from its
    /// receiver and terminates with a Close frame.
    pub fn close_outbound(&self) {
        let _ = self.outbound.lock().take();
    }

    /// Whether the outbound queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }

    /// Record a keepalive acknowledgment from the peer.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last keepalive acknowledgment.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}
