//! Event and log relay
//!
//! TigerStyle: Fire-and-forget publishing, failures logged and contained.
//!
//! Agent-emitted events and logs, plus the node's own lifecycle events,
//! are republished on the outward bus under a namespaced subject tree:
//! `$NEX.events.<namespace>.<event-type>` and
//! `$NEX.logs.<namespace>.<workload-id>`.

use bytes::Bytes;
use selkie_agent::AgentLogEnvelope;
use selkie_bus::Bus;
use selkie_core::TimeProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Subject prefix for outward events
pub const EVENT_SUBJECT_PREFIX: &str = "$NEX.events";

/// Subject prefix for outward logs
pub const LOG_SUBJECT_PREFIX: &str = "$NEX.logs";

/// Event type published when a deployment is accepted
pub const EVENT_TYPE_WORKLOAD_DEPLOYED: &str = "workload_deployed";

/// Event type published when a workload is stopped
pub const EVENT_TYPE_WORKLOAD_STOPPED: &str = "workload_stopped";

/// Event type published after a successful function trigger
pub const EVENT_TYPE_FUNCTION_EXEC_SUCCEEDED: &str = "function_exec_succeeded";

/// Event type published after a failed function trigger
pub const EVENT_TYPE_FUNCTION_EXEC_FAILED: &str = "function_exec_failed";

/// Outward subject for an event
pub fn event_subject(namespace: &str, event_type: &str) -> String {
    format!("{}.{}.{}", EVENT_SUBJECT_PREFIX, namespace, event_type)
}

/// Outward subject for a log line
pub fn log_subject(namespace: &str, workload_id: &str) -> String {
    format!("{}.{}.{}", LOG_SUBJECT_PREFIX, namespace, workload_id)
}

/// Minimal CloudEvents 1.0 envelope for node-originated events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    /// CloudEvents spec version
    pub specversion: String,
    /// Event id
    pub id: String,
    /// Event source (the node's id)
    pub source: String,
    /// Event type
    #[serde(rename = "type")]
    pub event_type: String,
    /// Emission time, RFC3339 UTC
    pub time: String,
    /// Payload content type
    pub datacontenttype: String,
    /// Event payload
    pub data: serde_json::Value,
}

impl CloudEvent {
    /// Create a new envelope
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        time: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            specversion: "1.0".to_string(),
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            event_type: event_type.into(),
            time: time.into(),
            datacontenttype: "application/json".to_string(),
            data,
        }
    }
}

/// Wire wrapper adding routing context to a CloudEvents envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    /// The CloudEvents envelope, flattened into the wrapper
    #[serde(flatten)]
    pub event: serde_json::Value,
    /// Namespace the event belongs to
    pub namespace: String,
    /// Event type, duplicated for subscribers that filter without parsing
    /// the envelope
    pub event_type: String,
}

/// Wire wrapper for an agent log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedLog {
    /// Namespace the workload belongs to
    pub namespace: String,
    /// Node that hosted the workload
    pub node_id: String,
    /// Workload that emitted the line
    pub workload_id: String,
    /// Relay timestamp, RFC3339 UTC
    pub timestamp: String,
    /// Log text
    pub text: String,
    /// Log level
    pub level: String,
    /// Emitting component id inside the agent
    pub id: String,
}

/// Publishes events and logs on the outward bus
///
/// All publishing is fire-and-forget: failures are logged and never
/// surfaced to the agent or the calling path.
#[derive(Clone)]
pub struct EventRelay {
    bus: Arc<dyn Bus>,
    node_id: String,
    time: Arc<dyn TimeProvider>,
}

impl EventRelay {
    /// Create a relay over the outward bus
    pub fn new(bus: Arc<dyn Bus>, node_id: impl Into<String>, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            bus,
            node_id: node_id.into(),
            time,
        }
    }

    /// Republish an agent-emitted CloudEvents envelope
    pub async fn publish_event(
        &self,
        namespace: &str,
        event_type: &str,
        event: serde_json::Value,
    ) {
        let emitted = EmittedEvent {
            event,
            namespace: namespace.to_string(),
            event_type: event_type.to_string(),
        };

        let payload = match serde_json::to_vec(&emitted) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(namespace, event_type, error = %e, "failed to serialize emitted event");
                return;
            }
        };

        let subject = event_subject(namespace, event_type);
        if let Err(e) = self.bus.publish(&subject, Bytes::from(payload)).await {
            warn!(subject = %subject, error = %e, "failed to publish event");
        }
    }

    /// Republish an agent-emitted log line
    pub async fn publish_log(&self, workload_id: &str, log: AgentLogEnvelope) {
        let subject = log_subject(&log.namespace, workload_id);

        let emitted = EmittedLog {
            namespace: log.namespace,
            node_id: self.node_id.clone(),
            workload_id: workload_id.to_string(),
            timestamp: self.time.now_rfc3339(),
            text: log.text,
            level: log.level,
            id: log.id,
        };

        let payload = match serde_json::to_vec(&emitted) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(workload_id, error = %e, "failed to serialize emitted log");
                return;
            }
        };

        if let Err(e) = self.bus.publish(&subject, Bytes::from(payload)).await {
            warn!(subject = %subject, error = %e, "failed to publish log");
        }
    }

    /// Publish a node-originated lifecycle event
    async fn publish_node_event(
        &self,
        namespace: &str,
        event_type: &str,
        data: serde_json::Value,
    ) {
        let event = CloudEvent::new(
            self.node_id.clone(),
            event_type,
            self.time.now_rfc3339(),
            data,
        );

        let event = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!(namespace, event_type, error = %e, "failed to serialize cloud event");
                return;
            }
        };

        self.publish_event(namespace, event_type, event).await;
    }

    /// Publish the `workload_deployed` event
    pub async fn publish_workload_deployed(&self, namespace: &str, workload_id: &str) {
        self.publish_node_event(
            namespace,
            EVENT_TYPE_WORKLOAD_DEPLOYED,
            serde_json::json!({ "workload_id": workload_id }),
        )
        .await;
    }

    /// Publish the `workload_stopped` event
    pub async fn publish_workload_stopped(&self, namespace: &str, workload_id: &str) {
        self.publish_node_event(
            namespace,
            EVENT_TYPE_WORKLOAD_STOPPED,
            serde_json::json!({ "workload_id": workload_id }),
        )
        .await;
    }

    /// Publish the `function_exec_succeeded` event
    pub async fn publish_function_exec_succeeded(
        &self,
        namespace: &str,
        workload_id: &str,
        trigger_subject: &str,
        elapsed_nanos: u64,
    ) {
        self.publish_node_event(
            namespace,
            EVENT_TYPE_FUNCTION_EXEC_SUCCEEDED,
            serde_json::json!({
                "workload_id": workload_id,
                "trigger_subject": trigger_subject,
                "elapsed_nanos": elapsed_nanos,
            }),
        )
        .await;
    }

    /// Publish the `function_exec_failed` event
    pub async fn publish_function_exec_failed(
        &self,
        namespace: &str,
        workload_id: &str,
        workload_name: &str,
        trigger_subject: &str,
        error: &str,
    ) {
        self.publish_node_event(
            namespace,
            EVENT_TYPE_FUNCTION_EXEC_FAILED,
            serde_json::json!({
                "workload_id": workload_id,
                "workload_name": workload_name,
                "trigger_subject": trigger_subject,
                "error": error,
            }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_bus::{MemoryBus, Message};
    use selkie_core::WallClockTime;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    async fn capture(bus: &MemoryBus, subject: &str) -> Arc<StdMutex<Vec<Message>>> {
        let collected: Arc<StdMutex<Vec<Message>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        bus.subscribe(
            subject,
            Arc::new(move |msg: Message| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(msg);
                })
            }),
        )
        .await
        .unwrap();
        collected
    }

    fn relay(bus: &MemoryBus) -> EventRelay {
        EventRelay::new(
            Arc::new(bus.clone()),
            "node-1",
            Arc::new(WallClockTime::new()),
        )
    }

    #[test]
    fn test_subject_layout() {
        assert_eq!(
            event_subject("default", EVENT_TYPE_WORKLOAD_STOPPED),
            "$NEX.events.default.workload_stopped"
        );
        assert_eq!(log_subject("default", "w1"), "$NEX.logs.default.w1");
    }

    #[tokio::test]
    async fn test_workload_stopped_event_wire_shape() {
        let bus = MemoryBus::new();
        let collected = capture(&bus, "$NEX.events.default.workload_stopped").await;

        relay(&bus).publish_workload_stopped("default", "w1").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let messages = collected.lock().unwrap();
        assert_eq!(messages.len(), 1);

        let parsed: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(parsed["namespace"], "default");
        assert_eq!(parsed["event_type"], "workload_stopped");
        assert_eq!(parsed["type"], "workload_stopped");
        assert_eq!(parsed["source"], "node-1");
        assert_eq!(parsed["specversion"], "1.0");
        assert_eq!(parsed["data"]["workload_id"], "w1");
    }

    #[tokio::test]
    async fn test_log_relay_wire_shape() {
        let bus = MemoryBus::new();
        let collected = capture(&bus, "$NEX.logs.default.w1").await;

        relay(&bus)
            .publish_log(
                "w1",
                AgentLogEnvelope {
                    namespace: "default".into(),
                    text: "hello".into(),
                    level: "info".into(),
                    id: "stdout".into(),
                },
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let messages = collected.lock().unwrap();
        assert_eq!(messages.len(), 1);

        let parsed: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(parsed["namespace"], "default");
        assert_eq!(parsed["node_id"], "node-1");
        assert_eq!(parsed["workload_id"], "w1");
        assert_eq!(parsed["text"], "hello");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["id"], "stdout");
        assert!(parsed["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = MemoryBus::new();
        // Nothing subscribed; publishing must not error or panic
        relay(&bus).publish_workload_deployed("default", "w1").await;
    }
}
