//! Kubernetes Event recording
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so reconciliation progress is visible via `kubectl describe`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the given resource
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "PhaseApplied")
    /// * `action` - What action was taken (e.g. "Reconcile")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// A phase was applied and the resource moved forward
    pub const PHASE_APPLIED: &str = "PhaseApplied";
    /// Every phase reports convergence
    pub const CONVERGED: &str = "Converged";
    /// External state was released on deletion
    pub const FINALIZED: &str = "Finalized";
    /// Reconciliation failed and will be retried
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    /// Finalization failed and will be retried
    pub const FINALIZE_FAILED: &str = "FinalizeFailed";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    /// Forward convergence
    pub const RECONCILE: &str = "Reconcile";
    /// Cleanup on deletion
    pub const FINALIZE: &str = "Finalize";
}
