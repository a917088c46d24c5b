//! Query and subscription lifecycle management for gqlink.
//!
//! This crate mediates between a GraphQL execution engine and a host that
//! can only exchange scalars, strings, and callbacks:
//! - `engine`: The [`ExecutionEngine`] contract the backing engine implements
//! - `session`: The host-facing [`Session`] facade with its handle registries
//! - `subscription`: Per-registration delivery state and cancellation
//!
//! ```
//! use gqlink_service::{Session, SessionError};
//! # use gqlink_service::{EngineError, ExecutionEngine, ResolveRequest, StreamKey, StreamRequest};
//! # use gqlink_response::Value;
//! # struct Engine;
//! # impl ExecutionEngine for Engine {
//! #     fn subscribe(&self, _: StreamRequest) -> Result<StreamKey, EngineError> { Ok(1) }
//! #     fn unsubscribe(&self, _: StreamKey) {}
//! #     fn resolve(&self, _: ResolveRequest) -> Result<Value, EngineError> { Ok(Value::Null) }
//! # }
//!
//! # fn main() -> Result<(), SessionError> {
//! let mut session = Session::new(Box::new(|| std::sync::Arc::new(Engine)));
//! session.start_service();
//!
//! let query = session.parse_query("query { hero { name } }")?;
//! let subscription = session.subscribe_with(
//!     query,
//!     "",
//!     "",
//!     |payload| println!("{payload}"),
//!     || println!("done"),
//! )?;
//!
//! session.unsubscribe(subscription);
//! session.stop_service();
//! # Ok(())
//! # }
//! ```

pub mod engine;
mod registry;
pub mod session;
pub mod subscription;

pub use engine::{
    EngineError, ExecutionEngine, Producer, ResolveRequest, StreamKey, StreamRequest,
};
pub use session::{EngineProvider, QueryHandle, Session, SessionError, SubscriptionHandle};
pub use subscription::{
    CompleteCallback, CompleteContext, NextCallback, NextContext, RegisteredSubscription,
    Subscription, DELIVERY_ERROR_PREFIX,
};
