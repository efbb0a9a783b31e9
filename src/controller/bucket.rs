//! ObjectBucket controller
//!
//! Wires the generic [`Reconciler`] into a kube-runtime `Controller` and
//! translates reconcile outcomes into requeue decisions and Events.

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::{InvocationResult, ReconcileOutcome, Reconciler};
use crate::adapter::BucketAdapter;
use crate::config::ControllerConfig;
use crate::crd::ObjectBucket;
use crate::events::{actions, reasons, EventPublisher, NoopEventPublisher};
use crate::phases::{FinalizerRegistrar, Phase, ResourceAllocator};
use crate::store::{ResourceId, ResourceStore};
use crate::Error;

/// Finalizer guarding the external bucket
pub const BUCKET_FINALIZER: &str = "connectors.lattice.dev/bucket-cleanup";

/// Name reported on Events emitted by this controller
pub const CONTROLLER_NAME: &str = "lattice-bucket-controller";

/// Build the reconciler for ObjectBuckets
///
/// The finalizer registrar comes first so no bucket is ever allocated
/// without a marker that guarantees its release.
pub fn bucket_reconciler(
    store: Arc<dyn ResourceStore<ObjectBucket>>,
    adapter: Arc<dyn BucketAdapter>,
) -> Reconciler<ObjectBucket> {
    let phases: Vec<Arc<dyn Phase<ObjectBucket>>> = vec![
        Arc::new(FinalizerRegistrar::new(store.clone(), BUCKET_FINALIZER)),
        Arc::new(ResourceAllocator::new(store.clone(), adapter)),
    ];
    Reconciler::new(store, BUCKET_FINALIZER, phases)
}

/// Shared state for the ObjectBucket controller
pub struct Context {
    /// Phase-driven reconciler
    pub reconciler: Reconciler<ObjectBucket>,
    /// Event publisher for progress and failures
    pub events: Arc<dyn EventPublisher>,
    /// Requeue and deadline settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a context with the given reconciler and settings
    pub fn new(reconciler: Reconciler<ObjectBucket>, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            events: Arc::new(NoopEventPublisher),
            config,
        }
    }

    /// Replace the event publisher
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    fn action_for(&self, outcome: &ReconcileOutcome) -> Action {
        match outcome {
            ReconcileOutcome::Advanced { .. } => Action::requeue(self.config.progress_requeue()),
            ReconcileOutcome::Converged => match self.config.resync_interval() {
                Some(interval) => Action::requeue(interval),
                None => Action::await_change(),
            },
            ReconcileOutcome::Finalized | ReconcileOutcome::Released | ReconcileOutcome::Gone => {
                Action::await_change()
            }
        }
    }
}

/// Reconcile an ObjectBucket
#[instrument(skip(bucket, ctx), fields(bucket = %bucket.name_any()))]
pub async fn reconcile(bucket: Arc<ObjectBucket>, ctx: Arc<Context>) -> Result<Action, Error> {
    let id = ResourceId::of(&*bucket)?;
    let object_ref = bucket.object_ref(&());
    let deleting = bucket.meta().deletion_timestamp.is_some();

    let result = ctx
        .reconciler
        .reconcile_with_deadline(&id, ctx.config.reconcile_timeout())
        .await;
    debug!(invocation = ?InvocationResult::from(&result), "invocation finished");

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let (reason, action) = if deleting {
                (reasons::FINALIZE_FAILED, actions::FINALIZE)
            } else {
                (reasons::RECONCILE_FAILED, actions::RECONCILE)
            };
            ctx.events
                .publish(&object_ref, EventType::Warning, reason, action, Some(e.to_string()))
                .await;
            return Err(e);
        }
    };

    match &outcome {
        ReconcileOutcome::Advanced { phase } => {
            info!(phase, "phase applied");
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Normal,
                    reasons::PHASE_APPLIED,
                    actions::RECONCILE,
                    Some(format!("applied phase {phase}")),
                )
                .await;
        }
        ReconcileOutcome::Converged => {
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Normal,
                    reasons::CONVERGED,
                    actions::RECONCILE,
                    Some(format!("bucket {} is ready", bucket.spec.bucket_name)),
                )
                .await;
        }
        ReconcileOutcome::Finalized => {
            info!("bucket released");
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Normal,
                    reasons::FINALIZED,
                    actions::FINALIZE,
                    Some(format!("bucket {} released", bucket.spec.bucket_name)),
                )
                .await;
        }
        ReconcileOutcome::Released | ReconcileOutcome::Gone => {}
    }

    Ok(ctx.action_for(&outcome))
}

/// Error policy for the ObjectBucket controller
///
/// Every failure is retried. Faults that resolve on their own (outages,
/// conflicts, timeouts) come back after the error delay; failures that need a
/// spec fix or operator action wait for the longer permanent-error delay, or
/// for the next change to the object, whichever comes first.
pub fn error_policy(bucket: Arc<ObjectBucket>, error: &Error, ctx: Arc<Context>) -> Action {
    let delay = if error.is_retryable() {
        ctx.config.error_requeue()
    } else {
        ctx.config.permanent_error_requeue()
    };
    error!(
        ?error,
        bucket = %bucket.name_any(),
        retry_in = ?delay,
        "reconciliation failed"
    );
    Action::requeue(delay)
}

/// Run the ObjectBucket controller until a shutdown signal arrives
pub async fn run(client: Client, ctx: Arc<Context>) {
    let buckets: Api<ObjectBucket> = match &ctx.config.watch_namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    info!(
        namespace = ctx.config.watch_namespace.as_deref().unwrap_or("*"),
        phases = ?ctx.reconciler.phase_names(),
        "starting ObjectBucket controller"
    );

    Controller::new(buckets, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => tracing::debug!(bucket = %obj.name, "reconciled"),
                Err(e) => warn!(error = %e, "controller error"),
            }
        })
        .await;

    info!("ObjectBucket controller stopped");
}
