use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::app::ports::EventSinkPort;

/// Emits every lifecycle event as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSinkPort for TracingEventSink {
    async fn publish(&self, event: &str, payload: Value) {
        info!(target: "tabular_relay::events", event, payload = %payload, "event.emitted");
    }
}

/// Keeps events in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().await.clone()
    }

    pub async fn names(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl EventSinkPort for RecordingEventSink {
    async fn publish(&self, event: &str, payload: Value) {
        self.events.lock().await.push((event.to_string(), payload));
    }
}

/// Fans out to several sinks in order
pub struct CompositeEventSink {
    sinks: Vec<std::sync::Arc<dyn EventSinkPort>>,
}

impl CompositeEventSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSinkPort>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSinkPort for CompositeEventSink {
    async fn publish(&self, event: &str, payload: Value) {
        for sink in &self.sinks {
            sink.publish(event, payload.clone()).await;
        }
    }
}
