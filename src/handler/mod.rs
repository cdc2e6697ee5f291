//! Handler module - method registration and invocation context.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps method names to handlers
//! - [`RequestContext`] - cancellation and progress for one invocation
//!
//! # Example
//!
//! ```
//! use npc::handler::{HandlerRegistry, RequestContext};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("count", |n: u32, ctx: RequestContext| async move {
//!     for i in 0..n {
//!         ctx.notify(&i).await.ok();
//!     }
//!     Ok::<_, String>(n)
//! });
//! ```

mod context;
mod registry;

pub(crate) use context::InboundCall;
pub use context::RequestContext;
pub use registry::{BoxFuture, Handler, HandlerRegistry, HandlerResult, TypedHandler};
