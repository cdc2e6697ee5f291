//! Per-call options for [`Endpoint::deliver`](crate::Endpoint::deliver).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Progress callback invoked once per Notify received for a call.
pub type NotifyFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Options for one outbound call.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use npc::DeliverOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = DeliverOptions::new()
///     .timeout(Duration::from_secs(1))
///     .cancel_on(token.clone())
///     .on_notify(|progress| println!("{progress}"));
/// ```
#[derive(Clone, Default)]
pub struct DeliverOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) on_notify: Option<NotifyFn>,
}

impl DeliverOptions {
    /// Options with no timeout, no token and no progress callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the call with `TimedOut` if no Ack arrives within `timeout`.
    ///
    /// A zero duration means no timeout. Overrides the endpoint's default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail the call with `Cancelled` when `token` fires.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Receive the peer's progress payloads for this call.
    pub fn on_notify<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on_notify = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for DeliverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverOptions")
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel.is_some())
            .field("on_notify", &self.on_notify.is_some())
            .finish()
    }
}
