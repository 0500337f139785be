//! Test doubles for the bus and the vclient runner.
//!
//! [`MemoryClient`] stands in for a broker: it records publications, keeps
//! subscription callbacks, and lets the caller inject inbound messages or
//! failures. [`ScriptedExecutor`] answers queries from a queue of canned
//! results.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use vcontrol_common::{BusConfig, QueryResult};

use crate::bus::{BusClient, WireCallback};
use crate::error::{BridgeError, Cancelled, Result};
use crate::vclient::CommandExecutor;

#[derive(Default)]
struct State {
    connected: AtomicBool,
    connect_attempts: AtomicUsize,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    connect_delay: Mutex<Duration>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscribers: Mutex<BTreeMap<u64, (String, WireCallback)>>,
}

/// Broker client that lives entirely in memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryClient {
    state: Arc<State>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `connect` calls so far.
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state.published.lock().clone()
    }

    /// Published payloads decoded as text, in order.
    pub fn published_text(&self) -> Vec<(String, String)> {
        self.state
            .published
            .lock()
            .iter()
            .map(|(topic, payload)| {
                (
                    topic.clone(),
                    String::from_utf8_lossy(payload).into_owned(),
                )
            })
            .collect()
    }

    /// Number of live broker-side subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.subscribers.lock().len()
    }

    /// Drop the connection, as a broker restart would.
    pub fn disconnect(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.state.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Make every connect attempt take this long.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Hand a message to every registered callback.
    ///
    /// Like a broker with a single client-wide receive hook, delivery is not
    /// filtered here; each callback decides whether the topic is its own.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let callbacks: Vec<WireCallback> = self
            .state
            .subscribers
            .lock()
            .values()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            callback(topic, payload);
        }
    }
}

#[async_trait]
impl BusClient for MemoryClient {
    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, _config: &BusConfig) -> Result<()> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::connection("connection refused"));
        }

        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(BridgeError::publish(topic, "not connected"));
        }
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(BridgeError::publish(topic, "broker rejected publication"));
        }

        self.state
            .published
            .lock()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, id: u64, topic: &str, callback: WireCallback) -> Result<()> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BridgeError::subscribe(topic, "broker rejected subscription"));
        }

        self.state
            .subscribers
            .lock()
            .insert(id, (topic.to_string(), callback));
        Ok(())
    }

    async fn unsubscribe(&self, id: u64) -> Result<()> {
        let removed = self.state.subscribers.lock().remove(&id);

        if self.state.fail_unsubscribe.load(Ordering::SeqCst) {
            let topic = removed.map(|(topic, _)| topic).unwrap_or_default();
            return Err(BridgeError::subscribe(topic, "broker rejected unsubscribe"));
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.subscribers.lock().clear();
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// [`CommandExecutor`] that replays queued results.
///
/// Once the queue is empty every query succeeds with no readings. Every call
/// is recorded, including ones that end up cancelled.
#[derive(Default)]
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<std::result::Result<QueryResult, Cancelled>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next query.
    pub fn push(&self, result: QueryResult) -> &Self {
        self.results.lock().push_back(Ok(result));
        self
    }

    /// Queue a cancellation for the next query.
    pub fn push_cancelled(&self) -> &Self {
        self.results.lock().push_back(Err(Cancelled));
        self
    }

    /// Command lists received so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn query(
        &self,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> std::result::Result<QueryResult, Cancelled> {
        self.calls.lock().push(commands.to_vec());

        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        self.results.lock().pop_front().unwrap_or_else(|| Ok(QueryResult::default()))
    }
}
