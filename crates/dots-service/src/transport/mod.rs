//! Pub/sub transport seam
//!
//! The protocol engine talks to the message broker only through
//! [`PubSubTransport`]. Inbound messages are delivered on the channel
//! returned by [`PubSubTransport::connect`]; the channel closes once the
//! transport disconnects.

pub mod memory;

use async_trait::async_trait;
use dots_core::{DotsError, DotsResult};
use tokio::sync::mpsc;

pub use memory::{MemoryBroker, MemoryTransport};

/// Delivery guarantee requested for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    /// Fire and forget
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible
    AtLeastOnce,
    /// Assured single delivery
    ExactlyOnce,
}

impl QoS {
    /// Map a numeric QoS level (0..=2)
    pub fn from_level(level: u8) -> DotsResult<Self> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(DotsError::config(format!("Invalid QoS level {other}"))),
        }
    }

    /// Numeric level
    pub fn level(self) -> u8 {
        self as u8
    }
}

/// Message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full topic the message was published on
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create a message
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Session with a pub/sub broker
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Open the session and return the inbound message stream
    async fn connect(&self) -> DotsResult<mpsc::UnboundedReceiver<InboundMessage>>;

    /// Subscribe to a topic filter (`+` and `#` wildcards)
    async fn subscribe(&self, filter: &str, qos: QoS) -> DotsResult<()>;

    /// Publish a payload
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DotsResult<()>;

    /// Close the session; the inbound stream ends after buffered messages
    async fn disconnect(&self) -> DotsResult<()>;

    /// Transport type identifier
    fn transport_type(&self) -> &'static str;
}

/// Match a topic against an MQTT style filter
///
/// `+` matches exactly one level, a trailing `#` matches any remaining levels
/// including none.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(level)) if expected == level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_single_level_wildcard() {
        assert!(topic_matches("/a/b/c", "/a/b/c"));
        assert!(topic_matches("/a/+/c", "/a/x/c"));
        assert!(!topic_matches("/a/+/c", "/a/x/y/c"));
        assert!(!topic_matches("/a/b", "/a/b/c"));
        assert!(!topic_matches("/a/b/c", "/a/b"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(topic_matches(
            "/data/input_service/model/sim/n1/#",
            "/data/input_service/model/sim/n1/demand"
        ));
        assert!(topic_matches("/a/#", "/a"));
        assert!(topic_matches("/a/#", "/a/b/c/d"));
        assert!(!topic_matches("/a/#", "/b/c"));
        assert!(!topic_matches("/a/#/c", "/a/b/c"));
    }

    #[test]
    fn test_lifecycle_subscription_shape() {
        let filter = "/lifecycle/dots-so/model/sim/model-a/+";
        assert!(topic_matches(filter, "/lifecycle/dots-so/model/sim/model-a/NewStep"));
        assert!(!topic_matches(filter, "/lifecycle/dots-so/model/sim/model-b/NewStep"));
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(QoS::from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(QoS::ExactlyOnce.level(), 2);
        assert!(QoS::from_level(3).is_err());
    }
}
