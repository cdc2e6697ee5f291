//! Handler registry for dispatching Emit and Deliver messages by method name.
//!
//! The last registration for a name wins. Handlers stay installed for the
//! endpoint's lifetime, across `close()` and reconnects, until replaced or
//! removed.
//!
//! # Example
//!
//! ```
//! use npc::handler::{HandlerRegistry, RequestContext};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("echo", |data: String, _ctx: RequestContext| async move {
//!     Ok::<_, String>(data)
//! });
//!
//! assert!(registry.contains("echo"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::RequestContext;

/// Outcome of one handler invocation: result payload or error payload.
pub type HandlerResult = std::result::Result<Value, Value>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle an invocation with its raw payload.
    fn call(&self, param: Value, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes the payload before calling the handler and encodes
/// whatever it returns.
pub struct TypedHandler<F, T, R, E, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (Fut, R, E)>,
}

impl<F, T, R, E, Fut> TypedHandler<F, T, R, E, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, E, Fut> Handler for TypedHandler<F, T, R, E, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
{
    fn call(&self, param: Value, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match serde_json::from_value(param) {
            Ok(v) => v,
            Err(e) => {
                let error = Value::from(format!("invalid param: {e}"));
                return Box::pin(async move { Err(error) });
            }
        };

        let fut = (self.handler)(parsed, ctx);
        Box::pin(async move {
            match fut.await {
                Ok(result) => serde_json::to_value(result)
                    .map_err(|e| Value::from(format!("invalid result: {e}"))),
                Err(error) => Err(serde_json::to_value(error)
                    .unwrap_or_else(|e| Value::from(format!("invalid error: {e}")))),
            }
        })
    }
}

/// Registry mapping method names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler, replacing any previous one for `name`.
    pub fn register<F, T, R, E, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.insert(name, Arc::new(TypedHandler::new(handler)));
    }

    /// Install an already-built handler, replacing any previous one for `name`.
    pub fn insert(&mut self, name: &str, handler: Arc<dyn Handler>) {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            tracing::debug!(method = name, "replaced handler");
        }
    }

    /// Remove the handler for `name`, returning it if there was one.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.remove(name)
    }

    /// Get a handler by method name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Check whether a handler is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_register_method() {
        let mut registry = HandlerRegistry::new();

        registry.register("echo", |data: String, _ctx| async move {
            Ok::<_, String>(data)
        });

        assert!(registry.get("echo").is_some());
        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.methods(), vec!["echo"]);
    }

    #[test]
    fn test_handler_not_found() {
        let registry = HandlerRegistry::new();

        assert!(registry.get("nonexistent").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut registry = HandlerRegistry::new();
        registry.register("a", |_: (), _ctx| async { Ok::<_, ()>(()) });
        registry.register("b", |_: (), _ctx| async { Ok::<_, ()>(()) });

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.methods(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register("m", |_: (), _ctx| async { Ok::<_, ()>("first") });
        registry.register("m", |_: (), _ctx| async { Ok::<_, ()>("second") });

        let handler = registry.get("m").unwrap();
        let out = handler
            .call(Value::Null, RequestContext::detached("m"))
            .await;
        assert_eq!(out, Ok(json!("second")));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_typed_handler_decodes_and_encodes() {
        #[derive(Deserialize)]
        struct Add {
            a: i64,
            b: i64,
        }

        let handler = TypedHandler::new(|input: Add, _ctx: RequestContext| async move {
            Ok::<_, String>(input.a + input.b)
        });

        let out = handler
            .call(json!({"a": 2, "b": 3}), RequestContext::detached("add"))
            .await;
        assert_eq!(out, Ok(json!(5)));
    }

    #[tokio::test]
    async fn test_handler_error_is_forwarded_verbatim() {
        let handler = TypedHandler::new(|_: (), _ctx: RequestContext| async move {
            Err::<(), _>(json!({"code": 404, "message": "no such file"}))
        });

        let out = handler
            .call(Value::Null, RequestContext::detached("open"))
            .await;
        assert_eq!(out, Err(json!({"code": 404, "message": "no such file"})));
    }

    #[tokio::test]
    async fn test_invalid_param() {
        let handler = TypedHandler::new(|n: u32, _ctx: RequestContext| async move { Ok::<_, ()>(n) });

        let out = handler
            .call(json!("not a number"), RequestContext::detached("inc"))
            .await;
        let error = out.unwrap_err();
        assert!(error.as_str().unwrap().starts_with("invalid param:"));
    }
}
