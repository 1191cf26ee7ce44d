// crates/mesh-gate-core/src/events.rs
// ============================================================================
// Module: Event Publisher
// Description: Tenant-stamped event emission over an external event bus.
// Purpose: Inject tenant/session metadata into every published event.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! The event publisher wraps an external event-bus client and merges
//! `{tenant_id, user_id, context_type}` into every payload before handing
//! it off. Publishing is best-effort auditing: failures are surfaced as a
//! non-fatal warning to the caller and must never roll back or fail an
//! otherwise-successful backend operation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

use crate::core::TenantContext;
use crate::interfaces::EventBusClient;
use crate::interfaces::PublishError;

// ============================================================================
// SECTION: Event Publisher
// ============================================================================

/// Publisher stamping tenant metadata onto outbound events.
#[derive(Debug, Clone)]
pub struct EventPublisher<C> {
    /// External event-bus client.
    client: C,
    /// Event source label recorded on every payload.
    source: String,
}

impl<C: EventBusClient> EventPublisher<C> {
    /// Creates a publisher with the given source label.
    #[must_use]
    pub fn new(client: C, source: impl Into<String>) -> Self {
        Self {
            client,
            source: source.into(),
        }
    }

    /// Publishes an event with tenant metadata merged into the payload.
    ///
    /// Non-object payloads are wrapped under a `detail` key so metadata
    /// always lands at the top level.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the bus rejects the event; callers
    /// treat this as a warning, never a request failure.
    pub async fn publish(
        &self,
        context: &TenantContext,
        event_type: &str,
        payload: Value,
    ) -> Result<(), PublishError> {
        let stamped = self.stamp(context, payload);
        self.client.publish(event_type, stamped).await
    }

    /// Merges tenant metadata and the source label into a payload.
    fn stamp(&self, context: &TenantContext, payload: Value) -> Value {
        let mut map = match payload {
            Value::Object(map) => map,
            other => {
                let mut wrapped = Map::new();
                wrapped.insert("detail".to_string(), other);
                wrapped
            }
        };
        map.insert("source".to_string(), Value::String(self.source.clone()));
        map.insert(
            "tenant_id".to_string(),
            Value::String(context.tenant_id().to_string()),
        );
        map.insert("user_id".to_string(), Value::String(context.user_id().to_string()));
        map.insert(
            "context_type".to_string(),
            Value::String(context.context_type().as_str().to_string()),
        );
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions.
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::core::ContextType;
    use crate::core::PermissionSet;
    use crate::core::ResourceLimits;
    use crate::core::TenantId;
    use crate::core::UserId;

    /// Event-bus stub recording published events.
    #[derive(Debug, Default, Clone)]
    struct RecordingBus {
        /// Captured `(event_type, payload)` pairs.
        events: Arc<Mutex<Vec<(String, Value)>>>,
    }

    #[async_trait]
    impl EventBusClient for RecordingBus {
        async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError> {
            if let Ok(mut events) = self.events.lock() {
                events.push((event_type.to_string(), payload));
            }
            Ok(())
        }
    }

    /// Builds a personal context for the fixture tenant.
    fn context() -> TenantContext {
        TenantContext::new(
            TenantId::new("acme"),
            UserId::new("user-1"),
            ContextType::Personal,
            PermissionSet::new(),
            ResourceLimits::empty(),
        )
    }

    #[tokio::test]
    async fn metadata_is_merged_into_object_payloads() {
        let bus = RecordingBus::default();
        let publisher = EventPublisher::new(bus.clone(), "mesh-gate");
        publisher
            .publish(&context(), "tool_call_completed", json!({"tool": "kv_get"}))
            .await
            .expect("publish");

        let events = bus.events.lock().expect("events");
        let (event_type, payload) = &events[0];
        assert_eq!(event_type, "tool_call_completed");
        assert_eq!(payload["tool"], "kv_get");
        assert_eq!(payload["tenant_id"], "acme");
        assert_eq!(payload["user_id"], "user-1");
        assert_eq!(payload["context_type"], "personal");
        assert_eq!(payload["source"], "mesh-gate");
    }

    #[tokio::test]
    async fn non_object_payloads_are_wrapped() {
        let bus = RecordingBus::default();
        let publisher = EventPublisher::new(bus.clone(), "mesh-gate");
        publisher.publish(&context(), "tool_call_failed", json!("boom")).await.expect("publish");

        let events = bus.events.lock().expect("events");
        let (_, payload) = &events[0];
        assert_eq!(payload["detail"], "boom");
        assert_eq!(payload["tenant_id"], "acme");
    }
}
