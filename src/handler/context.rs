//! Request context for handlers.
//!
//! Besides its decoded param, every handler invocation receives a
//! [`RequestContext`] giving it:
//! - `token` / `is_cancelled` / `cancelled` - the cancellation signal for this call
//! - `notify` - send a progress payload back to the caller
//!
//! # Example
//!
//! ```ignore
//! endpoint.on("download", |path: String, ctx: RequestContext| async move {
//!     for i in 1..=3 {
//!         if ctx.is_cancelled() {
//!             return Err("cancelled".to_string());
//!         }
//!         ctx.notify(&format!("progress={i}/3")).await.ok();
//!     }
//!     Ok(format!("Did download to {path}"))
//! });
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::{CallId, Message};

/// State of one inbound Deliver while its handler runs.
///
/// The `settled` flag moves from false to true exactly once; whoever flips it
/// owns the single Ack for this call.
pub(crate) struct InboundCall {
    token: CancellationToken,
    settled: AtomicBool,
}

impl InboundCall {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            settled: AtomicBool::new(false),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Mark the call settled. Returns false if it already was.
    pub(crate) fn try_settle(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Signal the handler's token.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

/// Path back to the caller for a Deliver invocation.
#[derive(Clone)]
struct ReplyPath {
    id: CallId,
    endpoint: Endpoint,
    call: Arc<InboundCall>,
}

/// Context passed to handlers.
///
/// `RequestContext` is `Clone` and can be moved into tasks spawned by the
/// handler.
#[derive(Clone)]
pub struct RequestContext {
    /// Method this invocation was dispatched for.
    method: Arc<str>,
    /// Cancellation signal for this invocation.
    token: CancellationToken,
    /// Present for Deliver invocations only.
    reply: Option<ReplyPath>,
}

impl RequestContext {
    /// Create a context with no peer behind it.
    ///
    /// Used for Emit invocations and for calling handlers directly in tests:
    /// `notify` is a no-op and the token can only be fired through
    /// [`token()`](Self::token).
    pub fn detached(method: &str) -> Self {
        Self {
            method: Arc::from(method),
            token: CancellationToken::new(),
            reply: None,
        }
    }

    pub(crate) fn for_deliver(
        method: &str,
        id: CallId,
        endpoint: Endpoint,
        call: Arc<InboundCall>,
    ) -> Self {
        Self {
            method: Arc::from(method),
            token: call.token().clone(),
            reply: Some(ReplyPath { id, endpoint, call }),
        }
    }

    /// Call id, `None` for Emit invocations.
    #[inline]
    pub fn id(&self) -> Option<CallId> {
        self.reply.as_ref().map(|r| r.id)
    }

    /// Method name.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Cancellation token for this invocation.
    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the caller asked to abandon this call.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the call is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Send a progress payload to the caller.
    ///
    /// No-op for Emit invocations and once this call has been answered.
    pub async fn notify<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let value = serde_json::to_value(payload)?;
        self.notify_value(value).await
    }

    /// Send an already-encoded progress payload to the caller.
    pub async fn notify_value(&self, payload: Value) -> Result<()> {
        let reply = match &self.reply {
            Some(r) => r,
            None => return Ok(()),
        };

        if reply.call.is_settled() {
            tracing::trace!(id = reply.id, "notify after settlement ignored");
            return Ok(());
        }

        reply.endpoint.send(Message::notify(reply.id, payload)).await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("id", &self.id())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
