//! In-memory broker and transport
//!
//! [`MemoryBroker`] routes publishes to every connected client with at least
//! one matching subscription, once per client. It keeps a history of all
//! publishes so tests can inspect what a service sent.

use super::{topic_matches, InboundMessage, PubSubTransport, QoS};
use async_trait::async_trait;
use dots_core::{DotsError, DotsResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

#[derive(Default)]
struct ClientEntry {
    sender: Option<mpsc::UnboundedSender<InboundMessage>>,
    filters: Vec<String>,
}

#[derive(Default)]
struct BrokerState {
    clients: RwLock<HashMap<Uuid, ClientEntry>>,
    history: Mutex<Vec<InboundMessage>>,
}

/// Shared in-memory broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new client session on this broker
    pub fn client(&self) -> MemoryTransport {
        MemoryTransport {
            client_id: Uuid::new_v4(),
            broker: self.clone(),
        }
    }

    /// Publish a message to all matching subscribers
    ///
    /// Returns the number of clients the message was delivered to.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        let message = InboundMessage::new(topic, payload);
        self.state.history.lock().push(message.clone());

        let clients = self.state.clients.read();
        let mut delivered = 0;
        for entry in clients.values() {
            let Some(sender) = entry.sender.as_ref() else {
                continue;
            };
            if entry.filters.iter().any(|filter| topic_matches(filter, topic))
                && sender.send(message.clone()).is_ok()
            {
                delivered += 1;
            }
        }
        trace!(topic, delivered, "Broker routed message");
        delivered
    }

    /// Every message published so far, in publish order
    pub fn history(&self) -> Vec<InboundMessage> {
        self.state.history.lock().clone()
    }

    /// Published messages whose topic matches `filter`
    pub fn published_matching(&self, filter: &str) -> Vec<InboundMessage> {
        self.state
            .history
            .lock()
            .iter()
            .filter(|message| topic_matches(filter, &message.topic))
            .cloned()
            .collect()
    }

    /// Subscriptions currently held by connected clients
    pub fn subscriptions(&self) -> Vec<String> {
        self.state
            .clients
            .read()
            .values()
            .filter(|entry| entry.sender.is_some())
            .flat_map(|entry| entry.filters.iter().cloned())
            .collect()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("clients", &self.state.clients.read().len())
            .field("published", &self.state.history.lock().len())
            .finish()
    }
}

/// Client session on a [`MemoryBroker`]
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    client_id: Uuid,
    broker: MemoryBroker,
}

impl MemoryTransport {
    /// Client id of this session
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Whether the session is open
    pub fn is_connected(&self) -> bool {
        self.broker
            .state
            .clients
            .read()
            .get(&self.client_id)
            .is_some_and(|entry| entry.sender.is_some())
    }
}

#[async_trait]
impl PubSubTransport for MemoryTransport {
    async fn connect(&self) -> DotsResult<mpsc::UnboundedReceiver<InboundMessage>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut clients = self.broker.state.clients.write();
        let entry = clients.entry(self.client_id).or_default();
        if entry.sender.is_some() {
            return Err(DotsError::transport("Client is already connected"));
        }
        entry.sender = Some(sender);
        Ok(receiver)
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> DotsResult<()> {
        let mut clients = self.broker.state.clients.write();
        match clients.get_mut(&self.client_id) {
            Some(entry) if entry.sender.is_some() => {
                if !entry.filters.iter().any(|existing| existing == filter) {
                    entry.filters.push(filter.to_string());
                }
                Ok(())
            }
            _ => Err(DotsError::transport("Cannot subscribe: client is not connected")),
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DotsResult<()> {
        if !self.is_connected() {
            return Err(DotsError::transport(format!(
                "Cannot publish on '{topic}': client is not connected"
            )));
        }
        self.broker.publish(topic, payload);
        Ok(())
    }

    async fn disconnect(&self) -> DotsResult<()> {
        if let Some(entry) = self.broker.state.clients.write().get_mut(&self.client_id) {
            entry.sender = None;
            entry.filters.clear();
        }
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_follows_subscriptions() {
        let broker = MemoryBroker::new();
        let a = broker.client();
        let b = broker.client();
        let mut a_rx = a.connect().await.unwrap();
        let mut b_rx = b.connect().await.unwrap();

        a.subscribe("/data/+/model/#", QoS::AtMostOnce).await.unwrap();
        a.subscribe("/data/x/model/#", QoS::AtMostOnce).await.unwrap();
        b.subscribe("/other/#", QoS::AtMostOnce).await.unwrap();

        b.publish("/data/x/model/sim/n/demand", b"1".to_vec()).await.unwrap();

        let received = a_rx.recv().await.unwrap();
        assert_eq!(received.topic, "/data/x/model/sim/n/demand");
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
        assert_eq!(broker.history().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_closes_stream() {
        let broker = MemoryBroker::new();
        let client = broker.client();
        let mut rx = client.connect().await.unwrap();
        client.subscribe("#", QoS::AtLeastOnce).await.unwrap();

        broker.publish("/a", b"x".to_vec());
        client.disconnect().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().topic, "/a");
        assert!(rx.recv().await.is_none());
        assert!(!client.is_connected());
        assert!(client.publish("/a", Vec::new()).await.is_err());
        assert!(client.subscribe("/a", QoS::AtMostOnce).await.is_err());
    }

    #[tokio::test]
    async fn test_double_connect_is_rejected() {
        let client = MemoryBroker::new().client();
        let _rx = client.connect().await.unwrap();
        assert!(client.connect().await.is_err());
        assert_eq!(client.transport_type(), "memory");
    }
}
