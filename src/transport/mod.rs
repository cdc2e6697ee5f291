//! Transport module - the boundary between an endpoint and its channel.
//!
//! An endpoint hands every outbound [`Message`] to a [`Transport`]; the host
//! hands every inbound one to [`Endpoint::receive`](crate::Endpoint::receive).
//! The channel must preserve order. Nothing else is assumed of it.
//!
//! Provides:
//! - [`Transport`] - the outbound send primitive
//! - [`transport_fn`] - a transport from a send closure
//! - [`ChannelTransport`] - in-process transport over a bounded mpsc channel
//! - [`spawn_receive_loop`] / [`pair`] - host-side plumbing for channel transports

mod channel;

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::message::Message;

pub use channel::{
    pair, spawn_receive_loop, ChannelConfig, ChannelTransport, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_SEND_TIMEOUT,
};

/// Outbound send primitive supplied by the host.
pub trait Transport: Send + Sync + 'static {
    /// Hand one message to the channel.
    ///
    /// A failure is reported to whichever endpoint operation triggered the
    /// send. Nothing is retried.
    fn send(&self, message: Message) -> BoxFuture<'_, Result<()>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<()>> {
        (**self).send(message)
    }
}

/// Transport backed by a send closure.
pub struct FnTransport<F> {
    send: F,
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn send(&self, message: Message) -> BoxFuture<'_, Result<()>> {
        Box::pin((self.send)(message))
    }
}

/// Build a transport from a send function.
///
/// ```
/// use npc::transport::transport_fn;
/// use npc::Endpoint;
///
/// let endpoint = Endpoint::new(transport_fn(|message| async move {
///     println!("outbound: {message:?}");
///     Ok(())
/// }));
/// ```
pub fn transport_fn<F, Fut>(send: F) -> FnTransport<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnTransport { send }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NpcError;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_transport_fn_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = transport_fn(move |message| {
            let tx = tx.clone();
            async move {
                tx.send(message)
                    .map_err(|e| NpcError::Transport(e.to_string()))
            }
        });

        transport
            .send(Message::emit("log", json!("hi")))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Message::emit("log", json!("hi"))));
    }

    #[tokio::test]
    async fn test_transport_fn_error_propagates() {
        let transport =
            transport_fn(|_message| async { Err(NpcError::Transport("port closed".into())) });

        let err = transport.send(Message::cancel(1)).await.unwrap_err();
        assert!(matches!(err, NpcError::Transport(ref m) if m == "port closed"));
    }

    #[tokio::test]
    async fn test_arc_transport() {
        let transport: Arc<dyn Transport> = Arc::new(transport_fn(|_| async { Ok(()) }));
        assert!(transport.send(Message::cancel(1)).await.is_ok());
    }
}
