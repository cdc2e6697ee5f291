//! Endpoint builder and correlation engine.
//!
//! An [`Endpoint`] sits on one side of an already-connected channel. It:
//! 1. Dispatches inbound Emit/Deliver messages to registered handlers
//! 2. Sends Deliver messages and correlates the Acks that answer them
//! 3. Routes Notify messages to the caller's progress callback
//! 4. Propagates cancellation and timeouts to the peer with Cancel messages
//!
//! # Settlement
//!
//! Every outbound call lives in the reply map until exactly one of four
//! events removes it: its Ack, its timeout, its cancellation token, or
//! [`Endpoint::close`]. Removal happens under the dispatch lock, so the first
//! event wins and the rest find nothing to do.
//!
//! # Example
//!
//! ```ignore
//! use npc::{DeliverOptions, Endpoint, RequestContext};
//!
//! let endpoint = Endpoint::builder()
//!     .handle("echo", |data: String, _ctx: RequestContext| async move {
//!         Ok::<_, String>(data)
//!     })
//!     .transport(transport)
//!     .build();
//!
//! let reply: String = endpoint
//!     .deliver("echo", "hello", DeliverOptions::new())
//!     .await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{NpcError, Result};
use crate::handler::{Handler, HandlerRegistry, HandlerResult, InboundCall, RequestContext};
use crate::message::{CallId, Message, Typ};
use crate::options::{DeliverOptions, NotifyFn};
use crate::transport::Transport;

/// Default maximum number of outbound calls awaiting an Ack.
pub const DEFAULT_MAX_PENDING_CALLS: usize = 65_536;

/// Error payload sent for a handler that failed with `null`.
pub const NULL_HANDLER_ERROR: &str = "handler failed";

/// Endpoint-wide configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Timeout applied to calls whose options do not set one.
    pub default_timeout: Option<Duration>,
    /// Maximum outbound calls awaiting an Ack.
    pub max_pending_calls: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            max_pending_calls: DEFAULT_MAX_PENDING_CALLS,
        }
    }
}

/// Builder for configuring and creating an endpoint.
pub struct EndpointBuilder {
    registry: HandlerRegistry,
    config: EndpointConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl EndpointBuilder {
    /// Create a new endpoint builder.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            config: EndpointConfig::default(),
            transport: None,
        }
    }

    /// Register a method handler.
    pub fn handle<F, T, R, E, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.registry.register(method, handler);
        self
    }

    /// Set the timeout for calls that do not set their own.
    ///
    /// Default: none
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of outbound calls awaiting an Ack.
    ///
    /// Default: 65536
    pub fn max_pending_calls(mut self, limit: usize) -> Self {
        self.config.max_pending_calls = limit;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the outbound transport.
    ///
    /// Without one the endpoint starts detached; see [`Endpoint::connect`].
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Build the endpoint.
    pub fn build(self) -> Endpoint {
        Endpoint {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    transport: self.transport,
                    next_id: 0,
                    replies: HashMap::new(),
                    notifies: HashMap::new(),
                    cancels: HashMap::new(),
                    handlers: self.registry,
                }),
                config: self.config,
            }),
        }
    }
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An outbound call waiting for its Ack.
struct PendingCall {
    reply: oneshot::Sender<Result<Value>>,
}

/// Everything guarded by the dispatch lock.
struct State {
    transport: Option<Arc<dyn Transport>>,
    next_id: CallId,
    /// Outbound calls by id.
    replies: HashMap<CallId, PendingCall>,
    /// Progress callbacks of outbound calls by id.
    notifies: HashMap<CallId, NotifyFn>,
    /// Running inbound Deliver invocations by id.
    cancels: HashMap<CallId, Arc<InboundCall>>,
    handlers: HandlerRegistry,
}

impl State {
    /// Next id not used by an outstanding call. Wraps on overflow.
    fn allocate_id(&mut self) -> CallId {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.replies.contains_key(&id) {
                return id;
            }
        }
    }

    /// Remove an outbound call and its progress callback.
    ///
    /// Returns the call if it was still outstanding: the caller has won the
    /// right to settle it.
    fn take_pending(&mut self, id: CallId) -> Option<PendingCall> {
        self.notifies.remove(&id);
        self.replies.remove(&id)
    }
}

struct Inner {
    state: Mutex<State>,
    config: EndpointConfig,
}

/// One side of a bidirectional call channel.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

impl Endpoint {
    /// Create an endpoint with default configuration sending through `transport`.
    pub fn new(transport: impl Transport) -> Self {
        EndpointBuilder::new().transport(transport).build()
    }

    /// Create an endpoint with no transport attached.
    ///
    /// Every send fails with [`NpcError::Disconnected`] until
    /// [`connect`](Self::connect) is called.
    pub fn detached() -> Self {
        EndpointBuilder::new().build()
    }

    /// Create a new endpoint builder.
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Register a handler for `method`, replacing any previous one.
    pub fn on<F, T, R, E, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.inner.state.lock().handlers.register(method, handler);
    }

    /// Register an untyped handler for `method`, replacing any previous one.
    pub fn on_raw(&self, method: &str, handler: Arc<dyn Handler>) {
        self.inner.state.lock().handlers.insert(method, handler);
    }

    /// Install (`Some`) or remove (`None`) the handler for `method`.
    pub fn set_handler(&self, method: &str, handler: Option<Arc<dyn Handler>>) {
        let mut state = self.inner.state.lock();
        match handler {
            Some(handler) => state.handlers.insert(method, handler),
            None => {
                state.handlers.remove(method);
            }
        }
    }

    /// Remove the handler for `method`. Returns whether one was installed.
    pub fn off(&self, method: &str) -> bool {
        self.inner.state.lock().handlers.remove(method).is_some()
    }

    /// Whether a handler is installed for `method`.
    pub fn has_handler(&self, method: &str) -> bool {
        self.inner.state.lock().handlers.contains(method)
    }

    /// Invoke `method` on the peer without waiting for a result.
    pub async fn emit<P: Serialize + ?Sized>(&self, method: &str, param: &P) -> Result<()> {
        let param = serde_json::to_value(param)?;
        self.send(Message::emit(method, param)).await
    }

    /// Invoke `method` on the peer and wait for its result.
    ///
    /// Fails with [`NpcError::Unimplemented`] if the peer has no handler,
    /// [`NpcError::TimedOut`] / [`NpcError::Cancelled`] if the options' timeout
    /// or token fires first, [`NpcError::Disconnected`] if the endpoint is
    /// closed meanwhile, and [`NpcError::Remote`] with the handler's error
    /// payload if the handler fails.
    pub async fn deliver<P, R>(&self, method: &str, param: &P, options: DeliverOptions) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let param = serde_json::to_value(param)?;
        let value = self.deliver_value(method, param, options).await?;
        serde_json::from_value(value).map_err(|e| NpcError::Decode(e.to_string()))
    }

    /// [`deliver`](Self::deliver) with an untyped param and result.
    pub async fn deliver_value(
        &self,
        method: &str,
        param: Value,
        options: DeliverOptions,
    ) -> Result<Value> {
        let DeliverOptions {
            timeout,
            cancel,
            on_notify,
        } = options;
        let deadline = timeout
            .or(self.inner.config.default_timeout)
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);

        let (tx, mut rx) = oneshot::channel();
        let (id, transport) = {
            let mut state = self.inner.state.lock();
            let transport = state.transport.clone().ok_or(NpcError::Disconnected)?;
            if state.replies.len() >= self.inner.config.max_pending_calls {
                tracing::warn!(
                    pending = state.replies.len(),
                    max_pending = self.inner.config.max_pending_calls,
                    "too many pending calls; refusing {}",
                    method
                );
                return Err(NpcError::TooManyPending);
            }
            let id = state.allocate_id();
            state.replies.insert(id, PendingCall { reply: tx });
            if let Some(f) = on_notify {
                state.notifies.insert(id, f);
            }
            (id, transport)
        };
        let mut guard = PendingGuard {
            endpoint: self,
            id,
            armed: true,
        };

        // both run from registration, so a slow send counts against the deadline
        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancelled, expired);

        tracing::trace!(id, method, "deliver");
        let abandoned = tokio::select! {
            biased;
            sent = transport.send(Message::deliver(id, method, param)) => match sent {
                Ok(()) => None,
                Err(e) => {
                    guard.armed = false;
                    let taken = self.inner.state.lock().take_pending(id).is_some();
                    return if taken { Err(e) } else { settled_outcome(&mut rx) };
                }
            },
            () = &mut cancelled => Some(NpcError::Cancelled),
            () = &mut expired => Some(NpcError::TimedOut),
        };
        drop(transport);

        let reason = match abandoned {
            Some(reason) => reason,
            None => tokio::select! {
                biased;
                outcome = &mut rx => {
                    guard.armed = false;
                    return outcome.unwrap_or(Err(NpcError::Disconnected));
                }
                () = &mut cancelled => NpcError::Cancelled,
                () = &mut expired => NpcError::TimedOut,
            },
        };

        guard.armed = false;
        let won = self.inner.state.lock().take_pending(id).is_some();
        if !won {
            tracing::debug!(id, "{} lost the race to settle the call", reason);
            return settled_outcome(&mut rx);
        }

        tracing::debug!(id, method, "call abandoned: {}", reason);
        if let Err(e) = self.send(Message::cancel(id)).await {
            tracing::debug!(id, "could not send cancel: {}", e);
        }
        Err(reason)
    }

    /// Handle one message from the peer.
    ///
    /// Must be called for every inbound message, in arrival order. Malformed
    /// messages, unknown kinds and messages for calls that no longer exist
    /// are dropped. The only error is a failure to send the `unimplemented`
    /// Ack for a Deliver nobody handles.
    pub async fn receive(&self, message: Message) -> Result<()> {
        tracing::trace!(typ = ?message.typ, id = ?message.id, "receive");
        match message.typ {
            Typ::Emit => self.on_emit(message),
            Typ::Deliver => return self.on_deliver(message).await,
            Typ::Notify => self.on_notify(message),
            Typ::Ack => self.on_ack(message),
            Typ::Cancel => self.on_cancel(message),
            Typ::Unknown(n) => tracing::debug!("dropping message of unknown kind {}", n),
        }
        Ok(())
    }

    fn on_emit(&self, message: Message) {
        let method = match message.method {
            Some(m) => m,
            None => {
                tracing::debug!("dropping emit without method");
                return;
            }
        };
        let handler = self.inner.state.lock().handlers.get(&method);
        let handler = match handler {
            Some(h) => h,
            None => {
                tracing::debug!(method = %method, "no handler for emit");
                return;
            }
        };

        let ctx = RequestContext::detached(&method);
        let param = message.param.unwrap_or(Value::Null);
        tokio::spawn(async move {
            if let Err(e) = handler.call(param, ctx).await {
                tracing::debug!(method = %method, "emit handler failed: {}", e);
            }
        });
    }

    async fn on_deliver(&self, message: Message) -> Result<()> {
        let (id, method) = match (message.id, message.method) {
            (Some(id), Some(method)) => (id, method),
            _ => {
                tracing::debug!("dropping deliver without id or method");
                return Ok(());
            }
        };
        let handler = self.inner.state.lock().handlers.get(&method);
        let handler = match handler {
            Some(h) => h,
            None => {
                tracing::debug!(id, method = %method, "no handler; answering unimplemented");
                let error = NpcError::Unimplemented.to_wire();
                return self.send(Message::ack(id, Err(error))).await;
            }
        };

        let call = Arc::new(InboundCall::new());
        if self
            .inner
            .state
            .lock()
            .cancels
            .insert(id, call.clone())
            .is_some()
        {
            tracing::debug!(id, "peer reused an outstanding call id");
        }

        let ctx = RequestContext::for_deliver(&method, id, self.clone(), call.clone());
        let param = message.param.unwrap_or(Value::Null);
        let endpoint = self.clone();
        tokio::spawn(async move {
            // run the handler on its own task so a panic still gets answered
            let outcome = match tokio::spawn(handler.call(param, ctx)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(id, method = %method, "handler did not complete: {}", e);
                    Err(Value::from(e.to_string()))
                }
            };
            endpoint.answer(id, &call, outcome).await;
        });
        Ok(())
    }

    /// Send the single Ack for an inbound call.
    async fn answer(&self, id: CallId, call: &Arc<InboundCall>, outcome: HandlerResult) {
        if !call.try_settle() {
            return;
        }
        // a null error reads as success on the other side
        let outcome = match outcome {
            Err(Value::Null) => Err(Value::from(NULL_HANDLER_ERROR)),
            other => other,
        };
        {
            let mut state = self.inner.state.lock();
            if state
                .cancels
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, call))
            {
                state.cancels.remove(&id);
            }
        }

        match self.send(Message::ack(id, outcome)).await {
            Ok(()) => {}
            Err(NpcError::Disconnected) => {
                tracing::debug!(id, "ack dropped: endpoint disconnected");
            }
            Err(e) => tracing::warn!(id, "could not send ack: {}", e),
        }
    }

    fn on_ack(&self, message: Message) {
        let id = match message.id {
            Some(id) => id,
            None => {
                tracing::debug!("dropping ack without id");
                return;
            }
        };
        let outcome = message.into_outcome().map_err(NpcError::from_wire);

        // settle under the lock so a racing timeout or cancel that finds the
        // entry gone can rely on the outcome already being in the channel
        let mut state = self.inner.state.lock();
        match state.take_pending(id) {
            Some(call) => {
                let _ = call.reply.send(outcome);
            }
            None => tracing::debug!(id, "ack for unknown or settled call"),
        }
    }

    fn on_notify(&self, message: Message) {
        let id = match message.id {
            Some(id) => id,
            None => {
                tracing::debug!("dropping notify without id");
                return;
            }
        };
        let notify = self.inner.state.lock().notifies.get(&id).cloned();
        match notify {
            Some(f) => f(message.param.unwrap_or(Value::Null)),
            None => tracing::debug!(id, "notify for unknown or settled call"),
        }
    }

    fn on_cancel(&self, message: Message) {
        let id = match message.id {
            Some(id) => id,
            None => {
                tracing::debug!("dropping cancel without id");
                return;
            }
        };
        let call = self.inner.state.lock().cancels.remove(&id);
        match call {
            Some(call) => {
                tracing::debug!(id, "peer cancelled call");
                call.cancel();
            }
            None => tracing::debug!(id, "cancel for unknown or completed call"),
        }
    }

    /// Tear the endpoint down.
    ///
    /// Settles every outstanding call with [`NpcError::Disconnected`], fires
    /// the token of every running inbound call and detaches the transport.
    /// Handlers stay installed. Safe to call any number of times.
    pub fn close(&self) {
        self.teardown(|| NpcError::Disconnected);
    }

    /// [`close`](Self::close), settling outstanding calls with `reason`
    /// instead.
    ///
    /// `reason` is read like an Ack error payload: `"cancelled"`,
    /// `"timedout"`, `"disconnected"` and `"unimplemented"` map to their
    /// variants, anything else becomes [`NpcError::Remote`].
    pub fn close_with(&self, reason: Value) {
        self.teardown(|| NpcError::from_wire(reason.clone()));
    }

    fn teardown(&self, reason: impl Fn() -> NpcError) {
        let (pending, inbound, transport) = {
            let mut state = self.inner.state.lock();
            let pending = state.replies.len();
            for (_, call) in state.replies.drain() {
                let _ = call.reply.send(Err(reason()));
            }
            state.notifies.clear();
            let inbound: Vec<Arc<InboundCall>> = state.cancels.drain().map(|(_, c)| c).collect();
            (pending, inbound, state.transport.take())
        };

        for call in &inbound {
            call.cancel();
        }
        if transport.is_some() {
            tracing::debug!(pending, inbound = inbound.len(), "endpoint closed");
        }
    }

    /// Attach a transport, replacing the current one.
    ///
    /// Used to reconnect after [`close`](Self::close).
    pub fn connect(&self, transport: impl Transport) {
        self.inner.state.lock().transport = Some(Arc::new(transport));
    }

    /// Whether a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().transport.is_some()
    }

    /// Non-owning handle to this endpoint.
    pub fn downgrade(&self) -> WeakEndpoint {
        WeakEndpoint {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of outbound calls awaiting an Ack.
    pub fn pending_calls(&self) -> usize {
        self.inner.state.lock().replies.len()
    }

    /// Number of inbound calls whose handler is still running.
    pub fn inbound_calls(&self) -> usize {
        self.inner.state.lock().cancels.len()
    }

    pub(crate) async fn send(&self, message: Message) -> Result<()> {
        let transport = self.inner.state.lock().transport.clone();
        let transport = transport.ok_or(NpcError::Disconnected)?;
        tracing::trace!(typ = ?message.typ, id = ?message.id, "send");
        transport.send(message).await
    }
}

/// Non-owning handle to an [`Endpoint`].
///
/// Does not keep the endpoint, or the transport it holds, alive.
#[derive(Clone)]
pub struct WeakEndpoint {
    inner: Weak<Inner>,
}

impl WeakEndpoint {
    /// The endpoint, if any handle to it is still alive.
    pub fn upgrade(&self) -> Option<Endpoint> {
        self.inner.upgrade().map(|inner| Endpoint { inner })
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Endpoint")
            .field("connected", &state.transport.is_some())
            .field("pending", &state.replies.len())
            .field("inbound", &state.cancels.len())
            .field("handlers", &state.handlers.methods())
            .finish()
    }
}

/// Outcome of a call settled by someone else.
fn settled_outcome(rx: &mut oneshot::Receiver<Result<Value>>) -> Result<Value> {
    rx.try_recv().unwrap_or(Err(NpcError::Disconnected))
}

/// Removes an outbound call whose `deliver` future is dropped before
/// settlement.
struct PendingGuard<'a> {
    endpoint: &'a Endpoint,
    id: CallId,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let taken = self.endpoint.inner.state.lock().take_pending(self.id);
        if taken.is_some() {
            tracing::debug!(id = self.id, "call dropped before settlement");
        }
    }
}
