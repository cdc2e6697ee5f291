//! In-process transport over a bounded `tokio::sync::mpsc` channel.
//!
//! # Architecture
//!
//! ```text
//! Endpoint A ── ChannelTransport ─► mpsc ─► receive loop ─► Endpoint B::receive
//! Endpoint A::receive ◄─ receive loop ◄─ mpsc ◄─ ChannelTransport ── Endpoint B
//! ```
//!
//! The receive loop feeds messages to the endpoint in arrival order. When the
//! sending side goes away (peer closed or dropped) the loop closes its own
//! endpoint, so calls still waiting on the peer settle as disconnected.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;

use super::Transport;
use crate::endpoint::Endpoint;
use crate::error::{NpcError, Result};
use crate::handler::BoxFuture;
use crate::message::Message;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time a send may wait for room in a full channel.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for channel transports.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Channel capacity in messages.
    pub capacity: usize,
    /// Timeout when waiting for room in a full channel.
    pub send_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Sending half of an in-process channel.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Message>,
    send_timeout: Duration,
}

impl ChannelTransport {
    /// Create a transport and the receiver its messages arrive on.
    pub fn channel(config: &ChannelConfig) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        (
            Self {
                tx,
                send_timeout: config.send_timeout,
            },
            rx,
        )
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.tx.send_timeout(message, self.send_timeout).await {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(NpcError::SendTimeout),
                Err(SendTimeoutError::Closed(_)) => Err(NpcError::Disconnected),
            }
        })
    }
}

/// Feed every message from `rx` to `endpoint`, in order.
///
/// Returns when the channel closes, after closing `endpoint`. The loop does
/// not keep `endpoint` alive: once every handle to it is dropped, its
/// transport goes with it and the peer's loop ends too.
pub fn spawn_receive_loop(endpoint: Endpoint, mut rx: mpsc::Receiver<Message>) -> JoinHandle<()> {
    let weak = endpoint.downgrade();
    drop(endpoint);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let endpoint = match weak.upgrade() {
                Some(e) => e,
                None => {
                    tracing::debug!("endpoint dropped; stopping receive loop");
                    return;
                }
            };
            if let Err(e) = endpoint.receive(message).await {
                tracing::warn!("receive failed: {}", e);
            }
        }
        tracing::debug!("inbound channel closed");
        if let Some(endpoint) = weak.upgrade() {
            endpoint.close();
        }
    })
}

/// Two endpoints connected to each other, with their receive loops running.
///
/// Closing either endpoint ends the other's inbound channel, which closes it
/// in turn. Dropping every handle to an endpoint has the same effect.
pub fn pair(config: ChannelConfig) -> (Endpoint, Endpoint) {
    let (to_right, right_rx) = ChannelTransport::channel(&config);
    let (to_left, left_rx) = ChannelTransport::channel(&config);

    let left = Endpoint::new(to_right);
    let right = Endpoint::new(to_left);

    spawn_receive_loop(left.clone(), left_rx);
    spawn_receive_loop(right.clone(), right_rx);

    (left, right)
}
