//! Remote log lines
//!
//! Components that need to report to the orchestrator's log topic receive a
//! [`LogSink`] instead of reaching for a process-wide logger.

use crate::transport::PubSubTransport;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Log levels understood by sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Detailed flow
    Debug,
    /// Lifecycle information
    Info,
    /// Absorbed anomalies
    Warn,
    /// Fail-stop errors
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Injectable sink for log lines
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Emit one log line
    async fn log(&self, level: LogLevel, message: &str);

    /// Check if a level is emitted
    fn is_enabled(&self, level: LogLevel) -> bool;
}

fn trace_locally(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => debug!("{message}"),
        LogLevel::Info => info!("{message}"),
        LogLevel::Warn => warn!("{message}"),
        LogLevel::Error => error!("{message}"),
    }
}

/// Sink writing to the local `tracing` subscriber only
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn log(&self, level: LogLevel, message: &str) {
        trace_locally(level, message);
    }

    fn is_enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

/// Sink publishing lines at or above a level on the instance's log topic
///
/// Every line is also traced locally.
pub struct TransportLogSink {
    transport: Arc<dyn PubSubTransport>,
    topic: String,
    source: String,
    min_level: LogLevel,
}

impl TransportLogSink {
    /// Create a sink publishing INFO and above on `topic`
    pub fn new(
        transport: Arc<dyn PubSubTransport>,
        topic: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            topic: topic.into(),
            source: source.into(),
            min_level: LogLevel::Info,
        }
    }

    /// Change the minimum published level
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    fn format(&self, level: LogLevel, message: &str) -> String {
        format!(
            "{} [{}][{level}]: {message}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            self.source
        )
    }
}

impl fmt::Debug for TransportLogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLogSink")
            .field("transport", &self.transport.transport_type())
            .field("topic", &self.topic)
            .field("min_level", &self.min_level)
            .finish()
    }
}

#[async_trait]
impl LogSink for TransportLogSink {
    async fn log(&self, level: LogLevel, message: &str) {
        trace_locally(level, message);
        if !self.is_enabled(level) {
            return;
        }
        let line = self.format(level, message);
        if let Err(err) = self.transport.publish(&self.topic, line.into_bytes()).await {
            debug!(error = %err, "Dropped remote log line");
        }
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryBroker, QoS};

    #[tokio::test]
    async fn test_only_info_and_above_are_published() {
        let broker = MemoryBroker::new();
        let service = broker.client();
        let _rx = service.connect().await.unwrap();
        let listener = broker.client();
        let mut rx = listener.connect().await.unwrap();
        listener.subscribe("/log/#", QoS::AtMostOnce).await.unwrap();

        let topic = "/log/model/dots-so/sim/model";
        let sink = TransportLogSink::new(Arc::new(service), topic, "test_service");
        sink.log(LogLevel::Debug, "hidden").await;
        sink.log(LogLevel::Info, "visible").await;

        let line = String::from_utf8(rx.recv().await.unwrap().payload).unwrap();
        assert!(line.ends_with("[test_service][INFO]: visible"));
        assert!(rx.try_recv().is_err());
        assert!(!sink.is_enabled(LogLevel::Debug));
        assert!(sink.with_min_level(LogLevel::Debug).is_enabled(LogLevel::Debug));
    }
}
