//! Subscription delivery state and operation classification.
//!
//! A [`Subscription`] owns the delivery state of one caller-visible stream:
//! the two callback slots, the stream key (when a live stream was actually
//! registered with the engine), and the registration flag that makes
//! cancellation idempotent. A [`RegisteredSubscription`] decides at
//! registration time whether the requested operation is a genuine
//! subscription (long-lived stream) or a one-shot query/mutation (resolve
//! once, deliver once, complete immediately), and funnels both through the
//! same callback protocol.

use crate::engine::{EngineError, ExecutionEngine, Producer, ResolveRequest, StreamKey, StreamRequest};
use gqlink_response::{envelope, to_json, Value};
use gqlink_syntax::{Document, OperationKind};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// Opaque single-owner token threaded through the next-callback.
pub type NextContext = Box<dyn Any + Send>;

/// Opaque single-owner token consumed by the completion-callback.
pub type CompleteContext = Box<dyn Any + Send>;

/// Receives one serialized payload and returns the replacement context
/// token for the following invocation.
pub type NextCallback = fn(NextContext, String) -> NextContext;

/// Receives the completion context; terminal, invoked at most once.
pub type CompleteCallback = fn(CompleteContext);

/// Prefix of the synthetic error message produced when delivery fails for a
/// reason the engine did not classify.
pub const DELIVERY_ERROR_PREFIX: &str = "error delivering subscription payload: ";

/// Registration state of a subscription.
///
/// One-shot operations never leave `Inactive`; genuine streams move to
/// `Registered` and end in the terminal `Unregistered` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Inactive,
    Registered,
    Unregistered,
}

struct DeliveryState {
    next_context: Option<NextContext>,
    next_callback: NextCallback,
    complete_context: Option<CompleteContext>,
    complete_callback: CompleteCallback,
    stream_key: Option<StreamKey>,
    registration: Registration,
}

/// The delivery-state object bridging engine pushes to caller callbacks.
pub struct Subscription {
    engine: Weak<dyn ExecutionEngine>,
    state: Mutex<DeliveryState>,
}

impl Subscription {
    /// Creates a subscription that does not yet own a stream registration.
    pub fn new(
        engine: Weak<dyn ExecutionEngine>,
        next_context: NextContext,
        next_callback: NextCallback,
        complete_context: CompleteContext,
        complete_callback: CompleteCallback,
    ) -> Self {
        Self {
            engine,
            state: Mutex::new(DeliveryState {
                next_context: Some(next_context),
                next_callback,
                complete_context: Some(complete_context),
                complete_callback,
                stream_key: None,
                registration: Registration::Inactive,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeliveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the engine's stream key and marks the subscription live.
    pub fn subscribe(&self, key: StreamKey) {
        let mut state = self.lock();
        state.registration = Registration::Registered;
        state.stream_key = Some(key);
    }

    /// Converts a payload into a response document and relays it through the
    /// next-callback.
    ///
    /// Failures never propagate out of this path: the engine may push from a
    /// context where an escaping error would be unobservable, so every
    /// failure becomes an in-band `{data: null, errors}` document. Pushes
    /// that arrive after cancellation or completion are dropped.
    pub fn deliver(&self, payload: Result<Value, EngineError>) {
        let document = match payload {
            Ok(value) => value,
            Err(EngineError::Execution { errors }) => envelope::error_document(errors),
            Err(other) => envelope::error_document(envelope::message_errors(format!(
                "{DELIVERY_ERROR_PREFIX}{other}"
            ))),
        };

        let text = match to_json(&document) {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "dropping unserializable subscription payload");
                return;
            }
        };

        // The context token is owned by exactly one place at a time: the
        // slot is emptied here and refilled with the callback's replacement
        // token. The callback runs without the lock held so it may safely
        // call back into this subscription.
        let (context, callback) = {
            let mut state = self.lock();
            if state.registration == Registration::Unregistered
                || state.complete_context.is_none()
            {
                return;
            }
            let Some(context) = state.next_context.take() else {
                return;
            };
            (context, state.next_callback)
        };

        let replacement = callback(context, text);
        self.lock().next_context = Some(replacement);
    }

    /// Cancels the subscription.
    ///
    /// Idempotent: only the first call on a live registration does work. The
    /// flag flips before the blocking release so concurrent or re-entrant
    /// attempts return immediately; the completion-callback fires only after
    /// the stream key has been released, and fires even when the engine is
    /// already gone.
    pub fn unsubscribe(&self) {
        let key = {
            let mut state = self.lock();
            if state.registration != Registration::Registered {
                return;
            }
            state.registration = Registration::Unregistered;
            state.stream_key.take()
        };

        if let Some(key) = key {
            match self.engine.upgrade() {
                Some(engine) => {
                    engine.unsubscribe(key);
                    debug!(key, "released subscription stream");
                }
                None => {
                    debug!(key, "engine already stopped; skipping stream release");
                }
            }
        }

        self.complete();
    }

    /// Invokes the completion-callback, consuming its context token.
    ///
    /// The token leaves the slot exactly once, so completion can never fire
    /// twice.
    pub(crate) fn complete(&self) {
        let slot = {
            let mut state = self.lock();
            state
                .complete_context
                .take()
                .map(|context| (context, state.complete_callback))
        };

        if let Some((context, callback)) = slot {
            callback(context);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Teardown without an explicit unsubscribe must still honor the
        // completion contract for live streams.
        self.unsubscribe();
    }
}

/// One registered subscription entry, created per `subscribe` call.
pub struct RegisteredSubscription {
    subscription: Option<Arc<Subscription>>,
}

impl RegisteredSubscription {
    /// Classifies the requested operation and either registers a live
    /// stream or resolves it once.
    ///
    /// Both branches run synchronously: the one-shot branch delivers its
    /// single payload and completes before this returns, and the streaming
    /// branch blocks until the engine confirms registration.
    pub fn new(
        engine: &Arc<dyn ExecutionEngine>,
        document: Arc<Document>,
        operation_name: &str,
        variables: Value,
        next_context: NextContext,
        next_callback: NextCallback,
        complete_context: CompleteContext,
        complete_callback: CompleteCallback,
    ) -> Result<Self, EngineError> {
        let subscription = Arc::new(Subscription::new(
            Arc::downgrade(engine),
            next_context,
            next_callback,
            complete_context,
            complete_callback,
        ));

        if engine.find_operation(&document, operation_name) == Some(OperationKind::Subscription) {
            let weak = Arc::downgrade(&subscription);
            let producer: Producer = Box::new(move |payload| {
                // The producer must never keep the consumer alive nor
                // dangle: a failed upgrade means the subscription is gone
                // and the push is dropped.
                if let Some(subscription) = weak.upgrade() {
                    subscription.deliver(payload);
                }
            });

            let key = engine.subscribe(StreamRequest {
                producer,
                document,
                operation_name: operation_name.to_string(),
                variables,
            })?;
            subscription.subscribe(key);
            debug!(key, operation = operation_name, "registered subscription stream");
        } else {
            subscription.deliver(engine.resolve(ResolveRequest {
                document,
                operation_name: operation_name.to_string(),
                variables,
            }));
            subscription.complete();
        }

        Ok(Self {
            subscription: Some(subscription),
        })
    }

    /// Forwards cancellation to the owned subscription and releases it, so
    /// a second call is a safe no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlink_response::{parse_json, Map};
    use gqlink_syntax::parse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn next_to_channel(context: NextContext, payload: String) -> NextContext {
        if let Some(tx) = context.downcast_ref::<mpsc::Sender<String>>() {
            tx.send(payload).ok();
        }
        context
    }

    fn complete_to_channel(context: CompleteContext) {
        if let Some(tx) = context.downcast_ref::<mpsc::Sender<()>>() {
            tx.send(()).ok();
        }
    }

    struct StubEngine {
        releases: AtomicUsize,
    }

    impl StubEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                releases: AtomicUsize::new(0),
            })
        }
    }

    impl ExecutionEngine for StubEngine {
        fn subscribe(&self, _request: StreamRequest) -> Result<StreamKey, EngineError> {
            Ok(1)
        }

        fn unsubscribe(&self, _key: StreamKey) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn resolve(&self, _request: ResolveRequest) -> Result<Value, EngineError> {
            Ok(Value::Null)
        }
    }

    fn channel_subscription(
        engine: &Arc<StubEngine>,
    ) -> (Subscription, mpsc::Receiver<String>, mpsc::Receiver<()>) {
        let (tx_next, rx_next) = mpsc::channel::<String>();
        let (tx_complete, rx_complete) = mpsc::channel::<()>();
        // The coerced Arc shares the caller's allocation, so the weak
        // reference stays live as long as the caller holds the engine.
        let engine: Arc<dyn ExecutionEngine> = engine.clone();
        let subscription = Subscription::new(
            Arc::downgrade(&engine),
            Box::new(tx_next),
            next_to_channel,
            Box::new(tx_complete),
            complete_to_channel,
        );
        (subscription, rx_next, rx_complete)
    }

    #[test]
    fn test_unsubscribe_without_registration_is_inert() {
        let engine = StubEngine::new();
        let (subscription, _rx_next, rx_complete) = channel_subscription(&engine);

        subscription.unsubscribe();
        assert!(rx_complete.try_recv().is_err());
        assert_eq!(engine.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_releases_and_completes_exactly_once() {
        let engine = StubEngine::new();
        let (subscription, _rx_next, rx_complete) = channel_subscription(&engine);
        subscription.subscribe(7);

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert!(rx_complete.try_recv().is_ok());
        assert!(rx_complete.try_recv().is_err());
        assert_eq!(engine.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deliver_threads_payloads_through_the_context() {
        let engine = StubEngine::new();
        let (subscription, rx_next, _rx_complete) = channel_subscription(&engine);
        subscription.subscribe(7);

        let mut members = Map::new();
        members.insert("tick".to_string(), Value::Int(1));
        subscription.deliver(Ok(Value::Map(members)));
        subscription.deliver(Ok(Value::Int(2)));

        assert_eq!(rx_next.try_recv().unwrap(), r#"{"tick":1}"#);
        assert_eq!(rx_next.try_recv().unwrap(), "2");
    }

    #[test]
    fn test_deliver_after_unsubscribe_is_dropped() {
        let engine = StubEngine::new();
        let (subscription, rx_next, rx_complete) = channel_subscription(&engine);
        subscription.subscribe(7);
        subscription.unsubscribe();

        subscription.deliver(Ok(Value::Int(1)));
        assert!(rx_next.try_recv().is_err());
        assert!(rx_complete.try_recv().is_ok());
    }

    #[test]
    fn test_execution_failure_becomes_error_envelope() {
        let engine = StubEngine::new();
        let (subscription, rx_next, _rx_complete) = channel_subscription(&engine);
        subscription.subscribe(7);

        subscription.deliver(Err(EngineError::Execution {
            errors: envelope::message_errors("field `hero` is not defined"),
        }));

        let document = parse_json(&rx_next.try_recv().unwrap()).unwrap();
        assert!(document.get(envelope::DATA).is_some_and(Value::is_null));
        let errors = document
            .get(envelope::ERRORS)
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_unclassified_failure_gets_prefixed_message() {
        let engine = StubEngine::new();
        let (subscription, rx_next, _rx_complete) = channel_subscription(&engine);
        subscription.subscribe(7);

        subscription.deliver(Err(EngineError::Internal("store unreachable".to_string())));

        let document = parse_json(&rx_next.try_recv().unwrap()).unwrap();
        let errors = document
            .get(envelope::ERRORS)
            .and_then(Value::as_list)
            .unwrap();
        let message = errors[0].as_str().unwrap();
        assert!(message.starts_with(DELIVERY_ERROR_PREFIX));
        assert!(message.ends_with("store unreachable"));
    }

    #[test]
    fn test_drop_of_live_subscription_completes() {
        let engine = StubEngine::new();
        let (subscription, _rx_next, rx_complete) = channel_subscription(&engine);
        subscription.subscribe(7);

        drop(subscription);
        assert!(rx_complete.try_recv().is_ok());
        assert_eq!(engine.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_engine_skips_release_but_completes() {
        let (tx_next, _rx_next) = mpsc::channel::<String>();
        let (tx_complete, rx_complete) = mpsc::channel::<()>();

        let engine: Arc<dyn ExecutionEngine> = StubEngine::new();
        let subscription = Subscription::new(
            Arc::downgrade(&engine),
            Box::new(tx_next),
            next_to_channel,
            Box::new(tx_complete),
            complete_to_channel,
        );
        subscription.subscribe(7);
        drop(engine);

        subscription.unsubscribe();
        assert!(rx_complete.try_recv().is_ok());
    }

    #[test]
    fn test_one_shot_branch_delivers_then_completes() {
        let engine = StubEngine::new();
        let engine_dyn: Arc<dyn ExecutionEngine> = engine.clone();
        let document = Arc::new(parse("{ now }").unwrap());

        let (tx_next, rx_next) = mpsc::channel::<String>();
        let (tx_complete, rx_complete) = mpsc::channel::<()>();
        let mut registered = RegisteredSubscription::new(
            &engine_dyn,
            document,
            "",
            Value::Map(Map::new()),
            Box::new(tx_next),
            next_to_channel,
            Box::new(tx_complete),
            complete_to_channel,
        )
        .unwrap();

        // Both callbacks fired inline, before any unsubscribe.
        assert_eq!(rx_next.try_recv().unwrap(), "null");
        assert!(rx_complete.try_recv().is_ok());

        // Cancellation afterwards neither completes again nor releases.
        registered.unsubscribe();
        registered.unsubscribe();
        assert!(rx_complete.try_recv().is_err());
        assert_eq!(engine.releases.load(Ordering::SeqCst), 0);
    }
}
