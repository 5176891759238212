//! Client registry and broadcast fan-out.
//!
//! The hub owns three bounded intake channels (register, unregister,
//! broadcast) drained by one serial event loop. Only that loop ever
//! mutates the registry; every other task communicates intent through
//! the channels via a [`HubHandle`]. Query methods read the registry
//! under a shared lock and are safe to call from any task — the loop
//! takes the write lock only for the brief mutation, never for the
//! duration of a fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use relay_core::{ClientId, Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::ServerConfig;

/// Posting onto a hub whose event loop has stopped.
#[derive(Debug, thiserror::Error)]
#[error("hub event loop is no longer running")]
pub struct HubClosed;

/// Clonable handle for posting onto the hub's intake channels.
///
/// This is the only way tasks other than the event loop interact with
/// the registry. Clients hold one as a non-owning back-reference.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Arc<Client>>,
    unregister_tx: mpsc::Sender<Arc<Client>>,
    broadcast_tx: mpsc::Sender<Arc<Message>>,
}

impl HubHandle {
    /// Submit a client for registration.
    pub async fn register(&self, client: Arc<Client>) -> Result<(), HubClosed> {
        self.register_tx.send(client).await.map_err(|_| HubClosed)
    }

    /// Submit a client for unregistration. A no-op for clients the hub
    /// does not know about.
    pub async fn unregister(&self, client: Arc<Client>) -> Result<(), HubClosed> {
        self.unregister_tx.send(client).await.map_err(|_| HubClosed)
    }

    /// Submit a message for fan-out to every registered client.
    pub async fn broadcast(&self, message: Message) -> Result<(), HubClosed> {
        self.broadcast_tx
            .send(Arc::new(message))
            .await
            .map_err(|_| HubClosed)
    }
}

/// Receiving halves of the intake channels, consumed by [`Hub::run`].
pub struct HubChannels {
    register_rx: mpsc::Receiver<Arc<Client>>,
    unregister_rx: mpsc::Receiver<Arc<Client>>,
    broadcast_rx: mpsc::Receiver<Arc<Message>>,
}

/// The central coordinator: registry plus broadcast engine.
pub struct Hub {
    registry: RwLock<HashMap<ClientId, Arc<Client>>>,
    handle: HubHandle,
    enqueue_wait: Duration,
    notify_timeout: Duration,
}

impl Hub {
    /// Create a hub and the channel set its event loop will drain.
    pub fn new(config: &ServerConfig) -> (Arc<Self>, HubChannels) {
        let (register_tx, register_rx) = mpsc::channel(config.intake_capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(config.intake_capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.intake_capacity);
        let hub = Arc::new(Self {
            registry: RwLock::new(HashMap::new()),
            handle: HubHandle {
                register_tx,
                unregister_tx,
                broadcast_tx,
            },
            enqueue_wait: config.enqueue_wait(),
            notify_timeout: config.notify_timeout(),
        });
        let channels = HubChannels {
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        (hub, channels)
    }

    /// A handle for posting onto the intake channels.
    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Display names of currently registered clients.
    pub fn connected_names(&self) -> Vec<String> {
        self.registry
            .read()
            .values()
            .map(|c| c.username.clone())
            .collect()
    }

    /// The serial event loop. Runs until `cancel` fires.
    ///
    /// Single-writer discipline: every registry mutation happens here.
    pub async fn run(self: Arc<Self>, mut channels: HubChannels, cancel: CancellationToken) {
        info!("hub event loop started");
        loop {
            tokio::select! {
                Some(client) = channels.register_rx.recv() => self.register(client),
                Some(client) = channels.unregister_rx.recv() => self.unregister(&client),
                Some(message) = channels.broadcast_rx.recv() => self.fan_out(message).await,
                () = cancel.cancelled() => break,
            }
        }
        info!("hub event loop stopped");
    }

    /// Insert a client, or reject it when its display name is taken.
    fn register(&self, client: Arc<Client>) {
        let inserted = {
            let mut registry = self.registry.write();
            if registry.values().any(|c| c.username == client.username) {
                None
            } else {
                registry.insert(client.id.clone(), Arc::clone(&client));
                Some(registry.len())
            }
        };

        match inserted {
            Some(count) => {
                info!(client_id = %client.id, username = %client.username, clients = count, "client registered");
                self.notify(Message::system(format!("{} has joined", client.username)));
            }
            None => {
                info!(client_id = %client.id, username = %client.username, "duplicate username rejected");
                // Tell the offender and close its queue, off the event loop.
                let wait = self.notify_timeout;
                tokio::spawn(async move {
                    let rejection = Arc::new(Message::system(
                        "That username is already connected. Pick another.",
                    ));
                    let _ = client.enqueue(rejection, wait).await;
                    client.close_outbound();
                });
            }
        }
    }

    /// Remove a client and close its queue. Idempotent.
    fn unregister(&self, client: &Arc<Client>) {
        let remaining = {
            let mut registry = self.registry.write();
            registry
                .remove(&client.id)
                .map(|_| registry.len())
        };
        let Some(count) = remaining else {
            debug!(client_id = %client.id, "unregister for unknown client ignored");
            return;
        };
        client.close_outbound();
        info!(client_id = %client.id, username = %client.username, clients = count, "client unregistered");
        self.notify(Message::system(format!("{} has left", client.username)));
    }

    /// Deliver one message to every registered client's outbound queue.
    ///
    /// Clients whose queue cannot accept the message within the bounded
    /// wait are scheduled for unregistration on a detached task — never
    /// removed synchronously here, so one dead peer cannot stall the
    /// loop or the remaining deliveries.
    async fn fan_out(&self, message: Arc<Message>) {
        let members: Vec<Arc<Client>> = self.registry.read().values().cloned().collect();
        debug!(
            recipients = members.len(),
            sender = %message.username,
            "broadcasting message"
        );

        let mut stalled = Vec::new();
        for client in members {
            if !client.enqueue(Arc::clone(&message), self.enqueue_wait).await {
                warn!(
                    client_id = %client.id,
                    username = %client.username,
                    "outbound queue stalled, scheduling unregistration"
                );
                stalled.push(client);
            }
        }

        if !stalled.is_empty() {
            let unregister_tx = self.handle.unregister_tx.clone();
            let timeout = self.notify_timeout;
            tokio::spawn(async move {
                for client in stalled {
                    if tokio::time::timeout(timeout, unregister_tx.send(client))
                        .await
                        .is_err()
                    {
                        warn!("timed out scheduling unregistration for stalled client");
                    }
                }
            });
        }
    }

    /// Best-effort, time-boxed system notification. Dropped, never
    /// retried, if the broadcast channel stays saturated.
    fn notify(&self, message: Message) {
        let broadcast_tx = self.handle.broadcast_tx.clone();
        let timeout = self.notify_timeout;
        tokio::spawn(async move {
            if tokio::time::timeout(timeout, broadcast_tx.send(Arc::new(message)))
                .await
                .is_err()
            {
                warn!("broadcast channel saturated, dropping system notification");
            }
        });
    }
}
