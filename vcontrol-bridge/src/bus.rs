//! Pub/sub connection and topic namespace.
//!
//! [`TelemetryBus`] owns the lazy connection, the topic layout and the
//! subscription registry. The broker itself sits behind [`BusClient`];
//! production uses [`ZenohClient`](crate::zenoh_client::ZenohClient).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use vcontrol_common::{BusConfig, build_topic};

use crate::error::{BridgeError, Result};

/// Upper bound for the broker-side unsubscribe.
pub const DEFAULT_UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw inbound delivery: full topic and payload bytes.
pub type WireCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Future returned by a [`MessageHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// User-level handler receiving the full topic and the payload as text.
///
/// Handlers are compared by `Arc` identity: subscribing the same handler
/// twice to the same subtopic is a no-op, and unsubscribing needs the same
/// `Arc`.
pub type MessageHandler = Arc<dyn Fn(String, String) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure into a [`MessageHandler`].
pub fn message_handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |topic, payload| Box::pin(f(topic, payload)))
}

/// Capability offered by a pub/sub broker client.
#[async_trait]
pub trait BusClient: Send + Sync + 'static {
    /// True while a usable connection exists.
    fn is_connected(&self) -> bool;

    /// Open a connection. Called only when [`is_connected`](Self::is_connected) is false.
    async fn connect(&self, config: &BusConfig) -> Result<()>;

    /// Publish a payload with at-least-once semantics where the broker has them.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Declare interest in `topic` and route its messages to `callback`.
    async fn subscribe(&self, id: u64, topic: &str, callback: WireCallback) -> Result<()>;

    /// Drop the subscription registered under `id`.
    async fn unsubscribe(&self, id: u64) -> Result<()>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}

/// One registered subscription.
struct Subscription {
    id: u64,
    full_topic: String,
    subtopic: String,
    handler: MessageHandler,
}

/// Publishes readings and routes inbound messages for one base topic.
///
/// Nothing touches the broker until the first publish or subscribe. When the
/// bus is not configured, every operation returns `false` quietly.
pub struct TelemetryBus<C: BusClient> {
    config: BusConfig,
    client: C,
    connect_lock: tokio::sync::Mutex<()>,
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl<C: BusClient> TelemetryBus<C> {
    pub fn new(config: BusConfig, client: C) -> Self {
        Self {
            config,
            client,
            connect_lock: tokio::sync::Mutex::new(()),
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// True when both a host and a base topic are configured.
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// The configured base topic.
    pub fn base_topic(&self) -> &str {
        self.config.base_topic.trim()
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Full topic for a subtopic under the base topic.
    pub fn build_topic(&self, subtopic: &str) -> String {
        build_topic(self.base_topic(), subtopic)
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Make sure a connection exists, connecting once if needed.
    ///
    /// Concurrent callers serialize on a lock, so only one connect attempt
    /// runs at a time; later callers see its result. A `false` return means
    /// "not this time", never a fatal error.
    pub async fn ensure_connected(&self, cancel: &CancellationToken) -> bool {
        if !self.is_configured() {
            return false;
        }

        if self.client.is_connected() {
            return true;
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            guard = self.connect_lock.lock() => guard,
        };

        if self.client.is_connected() {
            return true;
        }

        let endpoint = self.config.endpoint();
        info!(endpoint = %endpoint, "Connecting to bus");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            result = self.client.connect(&self.config) => result,
        };

        match result {
            Ok(()) => {
                info!(endpoint = %endpoint, "Connected to bus");
                true
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Failed to connect to bus");
                false
            }
        }
    }

    /// Publish a payload under `base_topic/subtopic`.
    ///
    /// Returns `false` when the bus is not configured, cannot be reached or
    /// rejects the publication.
    pub async fn publish_to(
        &self,
        subtopic: &str,
        payload: impl Into<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> bool {
        if !self.is_configured() || !self.ensure_connected(cancel).await {
            return false;
        }

        let topic = self.build_topic(subtopic);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            result = self.client.publish(&topic, payload.into()) => result,
        };

        match result {
            Ok(()) => {
                debug!(topic = %topic, "Published payload");
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to publish");
                false
            }
        }
    }

    /// Route messages on `base_topic/subtopic` to `handler`.
    ///
    /// The handler runs on the current tokio runtime. Errors and panics in
    /// the handler are logged and never reach the broker's dispatch.
    pub async fn subscribe(
        &self,
        subtopic: &str,
        handler: MessageHandler,
        cancel: &CancellationToken,
    ) -> bool {
        if !self.is_configured() || !self.ensure_connected(cancel).await {
            return false;
        }

        let full_topic = self.build_topic(subtopic);

        let id = {
            let mut subscriptions = self.subscriptions.lock();
            if subscriptions
                .iter()
                .any(|s| s.subtopic == subtopic && Arc::ptr_eq(&s.handler, &handler))
            {
                debug!(topic = %full_topic, "Handler already subscribed");
                return true;
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            subscriptions.push(Subscription {
                id,
                full_topic: full_topic.clone(),
                subtopic: subtopic.to_string(),
                handler: handler.clone(),
            });
            id
        };

        let callback = wire_callback(full_topic.clone(), handler, Handle::current());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BridgeError::subscribe(&full_topic, "cancelled")),
            result = self.client.subscribe(id, &full_topic, callback) => result,
        };

        match result {
            Ok(()) => {
                info!(topic = %full_topic, "Subscribed");
                true
            }
            Err(e) => {
                self.subscriptions.lock().retain(|s| s.id != id);
                warn!(topic = %full_topic, error = %e, "Failed to subscribe");
                false
            }
        }
    }

    /// Remove the subscription of `handler` on `subtopic`, if any.
    ///
    /// The broker-side unsubscribe always runs, bounded by `deadline`, so
    /// it still happens during shutdown. Its errors are swallowed.
    pub async fn unsubscribe(
        &self,
        subtopic: &str,
        handler: &MessageHandler,
        deadline: Duration,
    ) {
        let removed = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions
                .iter()
                .position(|s| s.subtopic == subtopic && Arc::ptr_eq(&s.handler, handler))
                .map(|index| subscriptions.remove(index))
        };

        let Some(subscription) = removed else {
            debug!(subtopic = %subtopic, "No matching subscription");
            return;
        };

        let unsubscribe = self.client.unsubscribe(subscription.id);
        let result = tokio::time::timeout(deadline, unsubscribe).await;

        match result {
            Ok(Ok(())) => info!(topic = %subscription.full_topic, "Unsubscribed"),
            Ok(Err(e)) => debug!(
                topic = %subscription.full_topic,
                error = %e,
                "Ignoring unsubscribe failure"
            ),
            Err(_) => debug!(
                topic = %subscription.full_topic,
                timeout_ms = deadline.as_millis() as u64,
                "Broker unsubscribe timed out"
            ),
        }
    }

    /// Close the connection. Registered subscriptions are forgotten.
    pub async fn close(&self) {
        self.subscriptions.lock().clear();

        if let Err(e) = self.client.close().await {
            warn!(error = %e, "Error closing bus connection");
        }
    }
}

/// Build the broker-facing callback for a subscription.
///
/// Drops messages for other topics, decodes the payload as UTF-8 and runs
/// the handler in its own task so that failures stay contained.
fn wire_callback(full_topic: String, handler: MessageHandler, runtime: Handle) -> WireCallback {
    Arc::new(move |topic: &str, payload: &[u8]| {
        if topic != full_topic {
            trace!(topic = %topic, expected = %full_topic, "Ignoring message for other topic");
            return;
        }

        let topic = topic.to_string();
        let text = String::from_utf8_lossy(payload).into_owned();
        let handler = handler.clone();

        runtime.spawn(async move {
            match tokio::spawn(handler(topic.clone(), text)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(topic = %topic, error = %e, "Message handler failed"),
                Err(e) => error!(topic = %topic, error = %e, "Message handler panicked"),
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryClient;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn configured() -> BusConfig {
        BusConfig {
            host: "router".to_string(),
            base_topic: "home/heating".to_string(),
            ..Default::default()
        }
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> MessageHandler {
        message_handler(move |_topic, _payload| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_build_topic() {
        let bus = TelemetryBus::new(configured(), MemoryClient::new());
        assert_eq!(bus.build_topic("getTempA"), "home/heating/getTempA");
        assert_eq!(bus.build_topic(""), "home/heating");

        let bus = TelemetryBus::new(
            BusConfig {
                base_topic: "a/b/".to_string(),
                ..configured()
            },
            MemoryClient::new(),
        );
        assert_eq!(bus.build_topic("c"), "a/b/c");
    }

    #[tokio::test]
    async fn test_unconfigured_bus_is_noop() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(BusConfig::default(), client.clone());
        let cancel = CancellationToken::new();

        assert!(!bus.publish_to("getTempA", "21.5", &cancel).await);
        assert!(
            !bus.subscribe("commands", counting_handler(Default::default()), &cancel)
                .await
        );
        assert_eq!(client.connect_attempts(), 0);
        assert!(client.published().is_empty());
    }

    #[tokio::test]
    async fn test_lazy_connect_on_first_publish() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();

        assert_eq!(client.connect_attempts(), 0);
        assert!(bus.publish_to("getTempA", "21.5", &cancel).await);
        assert!(bus.publish_to("getTempB", "40", &cancel).await);

        assert_eq!(client.connect_attempts(), 1);
        assert_eq!(
            client.published(),
            vec![
                ("home/heating/getTempA".to_string(), b"21.5".to_vec()),
                ("home/heating/getTempB".to_string(), b"40".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_connect_once() {
        let client = MemoryClient::new();
        client.set_connect_delay(Duration::from_millis(50));
        let bus = Arc::new(TelemetryBus::new(configured(), client.clone()));
        let cancel = CancellationToken::new();

        let a = {
            let bus = bus.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bus.ensure_connected(&cancel).await })
        };
        let b = {
            let bus = bus.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bus.ensure_connected(&cancel).await })
        };

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        assert_eq!(client.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_fatal() {
        let client = MemoryClient::new();
        client.fail_connect(true);
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();

        assert!(!bus.publish_to("getTempA", "21.5", &cancel).await);

        client.fail_connect(false);
        assert!(bus.publish_to("getTempA", "21.5", &cancel).await);
        assert_eq!(client.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_returns_false() {
        let client = MemoryClient::new();
        client.fail_publish(true);
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();

        assert!(!bus.publish_to("getTempA", "21.5", &cancel).await);
        assert!(client.published().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_filters_exact_topic() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(
            bus.subscribe("commands", counting_handler(counter.clone()), &cancel)
                .await
        );

        client.deliver("home/heating/commands", b"getTempA");
        client.deliver("home/heating/commandsX", b"getTempA");
        client.deliver("home/heating/getTempA", b"21.5");
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_receives_text_payload() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let handler = {
            let received = received.clone();
            message_handler(move |topic, payload| {
                let received = received.clone();
                async move {
                    received.lock().push((topic, payload));
                    Ok(())
                }
            })
        };

        assert!(bus.subscribe("commands", handler, &cancel).await);
        client.deliver("home/heating/commands", "getTempA,getTempB".as_bytes());
        settle().await;

        assert_eq!(
            *received.lock(),
            vec![(
                "home/heating/commands".to_string(),
                "getTempA,getTempB".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_break_dispatch() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let failing = message_handler(|_topic, _payload| async { anyhow::bail!("boom") });
        let panicking = message_handler(|_topic, payload| async move {
            if !payload.is_empty() {
                panic!("handler panic");
            }
            Ok(())
        });

        assert!(bus.subscribe("commands", failing, &cancel).await);
        assert!(bus.subscribe("commands", panicking, &cancel).await);
        assert!(
            bus.subscribe("commands", counting_handler(counter.clone()), &cancel)
                .await
        );

        client.deliver("home/heating/commands", b"getTempA");
        client.deliver("home/heating/commands", b"getTempB");
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_is_ignored() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let handler = counting_handler(Default::default());

        assert!(bus.subscribe("commands", handler.clone(), &cancel).await);
        assert!(bus.subscribe("commands", handler.clone(), &cancel).await);

        assert_eq!(bus.subscription_count(), 1);
        assert_eq!(client.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_subscribe_rolls_back() {
        let client = MemoryClient::new();
        client.fail_subscribe(true);
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();

        assert!(
            !bus.subscribe("commands", counting_handler(Default::default()), &cancel)
                .await
        );
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());
        let other = counting_handler(Default::default());

        assert!(bus.subscribe("commands", handler.clone(), &cancel).await);

        // Unknown handler: no-op.
        bus.unsubscribe("commands", &other, DEFAULT_UNSUBSCRIBE_TIMEOUT).await;
        assert_eq!(bus.subscription_count(), 1);

        bus.unsubscribe("commands", &handler, DEFAULT_UNSUBSCRIBE_TIMEOUT).await;
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(client.subscription_count(), 0);

        client.deliver("home/heating/commands", b"getTempA");
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_swallows_broker_errors() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let handler = counting_handler(Default::default());

        assert!(bus.subscribe("commands", handler.clone(), &cancel).await);
        client.fail_unsubscribe(true);

        bus.unsubscribe("commands", &handler, DEFAULT_UNSUBSCRIBE_TIMEOUT).await;
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_after_shutdown_reaches_broker() {
        let client = MemoryClient::new();
        let bus = TelemetryBus::new(configured(), client.clone());
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());

        assert!(bus.subscribe("commands", handler.clone(), &cancel).await);
        cancel.cancel();

        bus.unsubscribe("commands", &handler, DEFAULT_UNSUBSCRIBE_TIMEOUT).await;
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(client.subscription_count(), 0);

        client.deliver("home/heating/commands", b"getTempA");
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
