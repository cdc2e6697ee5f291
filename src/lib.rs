//! # npc
//!
//! Near procedure call: symmetric, bidirectional RPC over an
//! already-connected, ordered message channel (a worker port, a stdio pipe,
//! an in-process queue).
//!
//! Both sides of the channel hold an [`Endpoint`]. Either side may:
//! - **emit** a fire-and-forget invocation
//! - **deliver** a call and await its single result, with an optional
//!   timeout, cancellation token and progress callback
//! - handle the other side's calls, reporting progress with
//!   [`RequestContext::notify`] and observing cancellation with
//!   [`RequestContext::cancelled`]
//!
//! ## Architecture
//!
//! - **Messages** ([`Message`]): five kinds (Emit, Deliver, Notify, Ack,
//!   Cancel) sharing one record shape
//! - **Transport** ([`transport::Transport`]): the host's outbound send; the
//!   host feeds inbound messages to [`Endpoint::receive`]
//! - **Codecs** ([`codec`]): MsgPack and JSON for byte-oriented channels
//!
//! ## Example
//!
//! ```ignore
//! use npc::transport::{pair, ChannelConfig};
//! use npc::{DeliverOptions, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> npc::Result<()> {
//!     let (main, worker) = pair(ChannelConfig::default());
//!
//!     worker.on("download", |path: String, ctx: RequestContext| async move {
//!         ctx.notify(&"progress=1/1").await.ok();
//!         Ok::<_, String>(format!("Did download to {path}"))
//!     });
//!
//!     let reply: String = main
//!         .deliver(
//!             "download",
//!             "/path",
//!             DeliverOptions::new().on_notify(|p| println!("{p}")),
//!         )
//!         .await?;
//!     assert_eq!(reply, "Did download to /path");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod transport;

mod endpoint;
mod message;
mod options;

pub use endpoint::{
    Endpoint, EndpointBuilder, EndpointConfig, WeakEndpoint, DEFAULT_MAX_PENDING_CALLS,
    NULL_HANDLER_ERROR,
};
pub use error::{NpcError, Result};
pub use handler::RequestContext;
pub use message::{CallId, Message, Typ};
pub use options::{DeliverOptions, NotifyFn};
pub use tokio_util::sync::CancellationToken;
