// crates/mesh-gate-mcp/src/backends.rs
// ============================================================================
// Module: In-Memory Backends
// Description: Reference backend and event-bus implementations.
// Purpose: Serve tests and local development without cloud SDKs.
// Dependencies: mesh-gate-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! The in-memory backend implements the full `(service, action)` surface
//! against process-local state, honoring the tenant namespace prefix so
//! storage keys stay partitioned per tenant context exactly as a real
//! deployment partitions them. The recording event bus captures published
//! events for inspection. Production deployments substitute their own
//! [`BackendConnector`] and [`EventBusClient`] implementations; the core
//! never knows the difference.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use mesh_gate_core::Action;
use mesh_gate_core::BackendConnector;
use mesh_gate_core::BackendError;
use mesh_gate_core::BackendRequest;
use mesh_gate_core::EventBusClient;
use mesh_gate_core::PublishError;
use mesh_gate_core::Service;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts a required string parameter from tool arguments.
fn require_str<'a>(params: &'a Value, name: &str) -> Result<&'a str, BackendError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Permanent(format!("missing '{name}' parameter")))
}

/// Joins a namespace prefix and key into a partitioned storage key.
fn partitioned_key(namespace: &str, key: &str) -> String {
    format!("{namespace}/{key}")
}

// ============================================================================
// SECTION: In-Memory Backend
// ============================================================================

/// Stored artifact entry.
#[derive(Debug, Clone)]
struct ArtifactEntry {
    /// Base64-encoded content as supplied by the tool.
    content: String,
    /// Declared content type.
    content_type: String,
}

/// Process-local backend covering kv, artifacts, events, and workflows.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    /// Key-value entries keyed by partitioned key.
    kv: Mutex<BTreeMap<String, String>>,
    /// Artifact entries keyed by partitioned key.
    artifacts: Mutex<BTreeMap<String, ArtifactEntry>>,
    /// Events accepted through the backend surface.
    events: Mutex<Vec<Value>>,
    /// Monotonic workflow execution counter.
    executions: AtomicU64,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of events accepted via `events:publish`.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().map_or(0, |events| events.len())
    }

    /// Handles key-value operations.
    fn handle_kv(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        let mut kv = self
            .kv
            .lock()
            .map_err(|_| BackendError::Transient("kv store lock poisoned".to_string()))?;
        match request.action {
            Action::Read => {
                let key = partitioned_key(&request.namespace, require_str(&request.params, "key")?);
                Ok(json!({ "value": kv.get(&key).cloned() }))
            }
            Action::Write => {
                let key = partitioned_key(&request.namespace, require_str(&request.params, "key")?);
                let value = require_str(&request.params, "value")?;
                kv.insert(key, value.to_string());
                Ok(json!({"success": true}))
            }
            Action::Delete => {
                let key = partitioned_key(&request.namespace, require_str(&request.params, "key")?);
                let removed = kv.remove(&key).is_some();
                Ok(json!({ "success": removed }))
            }
            Action::List => {
                let prefix = request
                    .params
                    .get("prefix")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("{}/", request.namespace), |prefix| {
                        partitioned_key(&request.namespace, prefix)
                    });
                let keys: Vec<String> = kv
                    .keys()
                    .filter(|key| key.starts_with(&prefix))
                    .filter_map(|key| {
                        key.strip_prefix(&format!("{}/", request.namespace))
                            .map(ToString::to_string)
                    })
                    .collect();
                Ok(json!({ "keys": keys }))
            }
            Action::Publish | Action::Trigger => Err(unsupported(request)),
        }
    }

    /// Handles artifact operations.
    fn handle_artifacts(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        let mut artifacts = self
            .artifacts
            .lock()
            .map_err(|_| BackendError::Transient("artifact store lock poisoned".to_string()))?;
        match request.action {
            Action::Read => {
                let key = partitioned_key(&request.namespace, require_str(&request.params, "key")?);
                Ok(artifacts.get(&key).map_or_else(
                    || json!({ "content": Value::Null }),
                    |entry| {
                        json!({
                            "content": entry.content,
                            "content_type": entry.content_type,
                            "encoding": "base64",
                        })
                    },
                ))
            }
            Action::Write => {
                let key = partitioned_key(&request.namespace, require_str(&request.params, "key")?);
                let content = require_str(&request.params, "content")?;
                let content_type = request
                    .params
                    .get("content_type")
                    .and_then(Value::as_str)
                    .unwrap_or("text/plain");
                artifacts.insert(
                    key,
                    ArtifactEntry {
                        content: content.to_string(),
                        content_type: content_type.to_string(),
                    },
                );
                Ok(json!({"success": true}))
            }
            Action::List => {
                let prefix = request
                    .params
                    .get("prefix")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("{}/", request.namespace), |prefix| {
                        partitioned_key(&request.namespace, prefix)
                    });
                let keys: Vec<String> = artifacts
                    .keys()
                    .filter(|key| key.starts_with(&prefix))
                    .filter_map(|key| {
                        key.strip_prefix(&format!("{}/", request.namespace))
                            .map(ToString::to_string)
                    })
                    .collect();
                Ok(json!({ "keys": keys }))
            }
            Action::Delete | Action::Publish | Action::Trigger => Err(unsupported(request)),
        }
    }

    /// Handles event-bus operations.
    fn handle_events(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        if request.action != Action::Publish {
            return Err(unsupported(request));
        }
        let entries = request
            .params
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| BackendError::Permanent("missing 'entries' parameter".to_string()))?;
        let mut events = self
            .events
            .lock()
            .map_err(|_| BackendError::Transient("event store lock poisoned".to_string()))?;
        events.extend(entries.iter().cloned());
        Ok(json!({ "published": entries.len() }))
    }

    /// Handles workflow operations.
    fn handle_workflows(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        if request.action != Action::Trigger {
            return Err(unsupported(request));
        }
        let workflow = require_str(&request.params, "workflow")?;
        let execution = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(json!({
            "workflow": workflow,
            "execution_id": format!("exec-{execution}"),
        }))
    }
}

/// Builds the permanent error for an unsupported service/action pair.
fn unsupported(request: &BackendRequest) -> BackendError {
    BackendError::Permanent(format!(
        "unsupported operation: {}:{}",
        request.service, request.action
    ))
}

#[async_trait]
impl BackendConnector for InMemoryBackend {
    async fn invoke(
        &self,
        request: &BackendRequest,
        _deadline: Duration,
    ) -> Result<Value, BackendError> {
        match request.service {
            Service::Kv => self.handle_kv(request),
            Service::Artifacts => self.handle_artifacts(request),
            Service::Events => self.handle_events(request),
            Service::Workflows => self.handle_workflows(request),
        }
    }
}

// ============================================================================
// SECTION: Recording Event Bus
// ============================================================================

/// Event-bus client capturing published events in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventBus {
    /// Captured `(event_type, payload)` pairs.
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingEventBus {
    /// Creates an empty recording bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the captured events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.events.lock().map_or_else(|_| Vec::new(), |events| events.clone())
    }
}

#[async_trait]
impl EventBusClient for RecordingEventBus {
    async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| PublishError::Bus("event bus lock poisoned".to_string()))?;
        events.push((event_type.to_string(), payload));
        Ok(())
    }
}
