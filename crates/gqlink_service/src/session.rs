//! The session facade: handle registries plus service lifecycle.
//!
//! A [`Session`] is the single entry point a host embeds: it owns the
//! execution engine instance, the registry of parsed query documents, and
//! the registry of live subscriptions. All handles it hands out are plain
//! integers, so the facade is usable across a foreign-function boundary
//! where only scalars and strings travel.

use crate::engine::{EngineError, ExecutionEngine};
use crate::registry::Registry;
use crate::subscription::{
    CompleteCallback, CompleteContext, NextCallback, NextContext, RegisteredSubscription,
};
use gqlink_response::{parse_json, Map, Value};
use gqlink_syntax::{parse, Document, ParseError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Identifies a parsed query document held by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(i32);

impl QueryHandle {
    /// The raw integer value, for transport across a foreign boundary.
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a registered subscription held by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(i32);

impl SubscriptionHandle {
    /// The raw integer value, for transport across a foreign boundary.
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A failure reported by a session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation requires a started execution engine.
    #[error("service is not started")]
    ServiceNotStarted,
    /// The query handle does not refer to a live parsed document.
    #[error("unknown query handle {0}")]
    UnknownQuery(QueryHandle),
    /// The variables string was not a JSON object.
    #[error("invalid variables: {0}")]
    InvalidVariables(String),
    /// The query source failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The engine rejected the registration.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Produces a fresh execution engine each time the service starts.
pub type EngineProvider = Box<dyn FnMut() -> Arc<dyn ExecutionEngine> + Send>;

/// One host-facing session over an execution engine.
pub struct Session {
    provider: EngineProvider,
    engine: Option<Arc<dyn ExecutionEngine>>,
    queries: Registry<Arc<Document>>,
    subscriptions: Registry<RegisteredSubscription>,
}

impl Session {
    /// Creates a session; the engine is not started until
    /// [`start_service`](Self::start_service).
    pub fn new(provider: EngineProvider) -> Self {
        Self {
            provider,
            engine: None,
            queries: Registry::new(),
            subscriptions: Registry::new(),
        }
    }

    /// Starts (or restarts) the execution engine.
    ///
    /// Restarting replaces the engine instance; subscriptions registered
    /// against the previous instance stay alive but skip the stream release
    /// when they are later cancelled.
    pub fn start_service(&mut self) {
        self.engine = Some((self.provider)());
        info!("execution engine started");
    }

    /// Stops the execution engine.
    ///
    /// Every live subscription is cancelled (releasing its stream and firing
    /// its completion-callback) and both registries are flushed, so handle
    /// numbering restarts from 1. When no engine is running this is a no-op:
    /// documents parsed without a started service survive.
    pub fn stop_service(&mut self) {
        if self.engine.is_none() {
            return;
        }

        let subscriptions: Vec<_> = self.subscriptions.drain().collect();
        let flushed = subscriptions.len();
        for mut subscription in subscriptions {
            subscription.unsubscribe();
        }

        let queries = self.queries.drain().count();
        self.engine = None;
        info!(subscriptions = flushed, queries, "execution engine stopped");
    }

    /// Parses a query document and stores it under a fresh handle.
    ///
    /// Parsing does not need a started engine; documents are reusable across
    /// engine restarts.
    pub fn parse_query(&mut self, source: &str) -> Result<QueryHandle, SessionError> {
        let document = Arc::new(parse(source)?);
        let handle = QueryHandle(self.queries.insert(document));
        debug!(%handle, "parsed query document");
        Ok(handle)
    }

    /// Discards a parsed query document. Unknown handles are a no-op.
    ///
    /// Subscriptions already registered against the document keep their own
    /// reference and are unaffected.
    pub fn discard_query(&mut self, handle: QueryHandle) {
        if self.queries.remove(handle.0).is_some() {
            debug!(%handle, "discarded query document");
        }
    }

    /// Registers a subscription for an operation in a parsed document.
    ///
    /// For a subscription operation this registers a live stream with the
    /// engine; for a query or mutation it resolves once, delivering the
    /// single payload and completing before this returns. An error return
    /// means nothing was registered and neither callback will ever fire.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe(
        &mut self,
        query: QueryHandle,
        operation_name: &str,
        variables: &str,
        next_context: NextContext,
        next_callback: NextCallback,
        complete_context: CompleteContext,
        complete_callback: CompleteCallback,
    ) -> Result<SubscriptionHandle, SessionError> {
        let document = self
            .queries
            .get(query.0)
            .cloned()
            .ok_or(SessionError::UnknownQuery(query))?;
        let variables = parse_variables(variables)?;
        let engine = self
            .engine
            .as_ref()
            .ok_or(SessionError::ServiceNotStarted)?;

        let registered = RegisteredSubscription::new(
            engine,
            document,
            operation_name,
            variables,
            next_context,
            next_callback,
            complete_context,
            complete_callback,
        )?;

        let handle = SubscriptionHandle(self.subscriptions.insert(registered));
        debug!(%handle, %query, operation = operation_name, "registered subscription");
        Ok(handle)
    }

    /// Like [`subscribe`](Self::subscribe), but takes plain closures instead
    /// of the context-and-callback pairs.
    pub fn subscribe_with(
        &mut self,
        query: QueryHandle,
        operation_name: &str,
        variables: &str,
        next: impl FnMut(String) + Send + 'static,
        complete: impl FnOnce() + Send + 'static,
    ) -> Result<SubscriptionHandle, SessionError> {
        self.subscribe(
            query,
            operation_name,
            variables,
            Box::new(NextHandler(Box::new(next))),
            invoke_next_handler,
            Box::new(CompleteHandler(Some(Box::new(complete)))),
            invoke_complete_handler,
        )
    }

    /// Cancels a subscription. Unknown handles are a no-op.
    ///
    /// For a live stream this releases the engine registration and fires the
    /// completion-callback. One-shot subscriptions already completed, so
    /// cancelling them only removes the registry entry.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        if let Some(mut registered) = self.subscriptions.remove(handle.0) {
            registered.unsubscribe();
            debug!(%handle, "cancelled subscription");
        }
    }

    /// Whether the execution engine is currently started.
    pub fn is_started(&self) -> bool {
        self.engine.is_some()
    }

    /// Number of live parsed query documents.
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Number of live subscription registrations.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropping the session must honor the completion contract for every
        // live subscription, same as an explicit stop.
        self.stop_service();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("started", &self.engine.is_some())
            .field("queries", &self.queries.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

/// Interprets a host-provided variables string.
///
/// The empty string stands for "no variables". Anything else must parse as
/// a JSON object.
fn parse_variables(text: &str) -> Result<Value, SessionError> {
    if text.is_empty() {
        return Ok(Value::Map(Map::new()));
    }
    let value =
        parse_json(text).map_err(|error| SessionError::InvalidVariables(error.to_string()))?;
    if value.is_map() {
        Ok(value)
    } else {
        Err(SessionError::InvalidVariables(
            "variables must be a JSON object".to_string(),
        ))
    }
}

struct NextHandler(Box<dyn FnMut(String) + Send>);

struct CompleteHandler(Option<Box<dyn FnOnce() + Send>>);

fn invoke_next_handler(mut context: NextContext, payload: String) -> NextContext {
    if let Some(handler) = context.downcast_mut::<NextHandler>() {
        (handler.0)(payload);
    }
    context
}

fn invoke_complete_handler(mut context: CompleteContext) {
    if let Some(handler) = context.downcast_mut::<CompleteHandler>() {
        if let Some(complete) = handler.0.take() {
            complete();
        }
    }
}
