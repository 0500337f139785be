//! [`BusClient`] backed by a Zenoh session.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use vcontrol_common::BusConfig;
use zenoh::Session;
use zenoh::pubsub::Subscriber;
use zenoh::qos::CongestionControl;
use zenoh::sample::{Sample, SampleKind};

use crate::bus::{BusClient, WireCallback};
use crate::error::{BridgeError, Result};

/// Zenoh client with a session opened on demand.
///
/// Publications use `CongestionControl::Block`, so they wait for room
/// instead of being dropped under load.
#[derive(Default)]
pub struct ZenohClient {
    session: Mutex<Option<Session>>,
    subscribers: Mutex<HashMap<u64, Subscriber<()>>>,
}

impl ZenohClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<Session> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| BridgeError::connection("no Zenoh session"))
    }
}

#[async_trait]
impl BusClient for ZenohClient {
    fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.is_closed())
    }

    async fn connect(&self, config: &BusConfig) -> Result<()> {
        let session = vcontrol_common::connect(config)
            .await
            .map_err(BridgeError::connection)?;

        debug!(zid = %session.zid(), "Zenoh session ready");

        let previous = self.session.lock().replace(session);
        if let Some(previous) = previous {
            closed_cleanly(previous.close().await);
        }

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let session = self.session()?;

        session
            .put(topic, payload)
            .congestion_control(CongestionControl::Block)
            .await
            .map_err(|e| BridgeError::publish(topic, e))
    }

    async fn subscribe(&self, id: u64, topic: &str, callback: WireCallback) -> Result<()> {
        let session = self.session()?;

        let subscriber = session
            .declare_subscriber(topic.to_string())
            .callback(move |sample: Sample| {
                if sample.kind() == SampleKind::Delete {
                    return;
                }
                let payload = sample.payload().to_bytes();
                callback(sample.key_expr().as_str(), &payload[..]);
            })
            .await
            .map_err(|e| BridgeError::subscribe(topic, e))?;

        self.subscribers.lock().insert(id, subscriber);
        Ok(())
    }

    async fn unsubscribe(&self, id: u64) -> Result<()> {
        let subscriber = self.subscribers.lock().remove(&id);

        match subscriber {
            Some(subscriber) => {
                let topic = subscriber.key_expr().to_string();
                subscriber
                    .undeclare()
                    .await
                    .map_err(|e| BridgeError::subscribe(topic, e))
            }
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        let subscribers: Vec<Subscriber<()>> = self
            .subscribers
            .lock()
            .drain()
            .map(|(_, subscriber)| subscriber)
            .collect();

        for subscriber in subscribers {
            if let Err(e) = subscriber.undeclare().await {
                debug!(error = %e, "Error undeclaring subscriber");
            }
        }

        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await.map_err(BridgeError::connection)?;
        }

        Ok(())
    }
}

/// Log a failed close of a replaced session; the new session stays usable.
fn closed_cleanly<E: std::fmt::Display>(result: std::result::Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Error closing previous Zenoh session");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disconnected() {
        let client = ZenohClient::new();
        assert!(!client.is_connected());
        assert!(client.session().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_session_fails() {
        let client = ZenohClient::new();
        let err = client
            .publish("vcontrol/getTempA", b"21.5".to_vec())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::BusConnection(_)));
    }

    #[tokio::test]
    async fn test_close_without_session_is_ok() {
        let client = ZenohClient::new();
        assert!(client.close().await.is_ok());
        assert!(client.unsubscribe(7).await.is_ok());
    }

    #[test]
    fn test_replaced_session_close_error_is_not_fatal() {
        assert!(closed_cleanly::<String>(Ok(())));
        assert!(!closed_cleanly(Err("session already closed".to_string())));
    }
}
