//! The backing execution engine contract.
//!
//! The engine is an external collaborator: it validates, executes, and can
//! stream updates for GraphQL operations. This module defines the narrow
//! surface the lifecycle manager consumes; everything behind it (schema,
//! resolvers, data access, threading) is opaque.

use gqlink_response::Value;
use gqlink_syntax::{Document, OperationKind};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifies a live stream registration inside the engine.
pub type StreamKey = u64;

/// Pushes one stream payload toward a subscription.
///
/// The engine may invoke this from any thread it owns. The closure holds
/// only a weak reference to the consumer, so a push after the consumer is
/// gone is dropped silently.
pub type Producer = Box<dyn Fn(Result<Value, EngineError>) + Send + Sync>;

/// A failure reported by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A classified execution or schema failure carrying structured
    /// GraphQL errors.
    #[error("execution failed")]
    Execution { errors: Value },
    /// Any other engine-side failure.
    #[error("{0}")]
    Internal(String),
}

/// A request to register a long-lived stream.
pub struct StreamRequest {
    pub producer: Producer,
    pub document: Arc<Document>,
    pub operation_name: String,
    pub variables: Value,
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// A request to resolve a query or mutation once.
#[derive(Debug)]
pub struct ResolveRequest {
    pub document: Arc<Document>,
    pub operation_name: String,
    pub variables: Value,
}

/// The backing execution engine.
///
/// All methods are blocking entry points: an engine that runs its work
/// asynchronously hides that behind this trait and returns once the result
/// is available.
pub trait ExecutionEngine: Send + Sync {
    /// Classifies the operation a request refers to.
    ///
    /// The default delegates to the document itself: the named operation, or
    /// the sole operation when the name is empty. Engines that perform their
    /// own validation may override this.
    fn find_operation(&self, document: &Document, operation_name: &str) -> Option<OperationKind> {
        document.operation(operation_name).map(|op| op.kind)
    }

    /// Registers a live stream and blocks until the registration is
    /// confirmed, returning the key needed to later release it.
    fn subscribe(&self, request: StreamRequest) -> Result<StreamKey, EngineError>;

    /// Releases a stream registration and blocks until the release is
    /// complete. After this returns the producer will not be invoked again.
    fn unsubscribe(&self, key: StreamKey);

    /// Executes a query or mutation once and blocks for the full response
    /// document.
    fn resolve(&self, request: ResolveRequest) -> Result<Value, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlink_syntax::parse;

    struct NullEngine;

    impl ExecutionEngine for NullEngine {
        fn subscribe(&self, _request: StreamRequest) -> Result<StreamKey, EngineError> {
            Ok(1)
        }

        fn unsubscribe(&self, _key: StreamKey) {}

        fn resolve(&self, _request: ResolveRequest) -> Result<Value, EngineError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_default_find_operation_classifies_by_document() {
        let engine = NullEngine;
        let document = parse("subscription S { ticks } query Q { now }").unwrap();

        assert_eq!(
            engine.find_operation(&document, "S"),
            Some(OperationKind::Subscription)
        );
        assert_eq!(
            engine.find_operation(&document, "Q"),
            Some(OperationKind::Query)
        );
        // Two operations make the empty name ambiguous.
        assert_eq!(engine.find_operation(&document, ""), None);
    }
}
