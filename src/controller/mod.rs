//! Phase-driven reconciliation
//!
//! [`Reconciler`] is resource-kind agnostic: it loads a record, decides
//! between convergence and finalization, and walks its configured phases.
//! Kind-specific wiring into the kube-runtime controller lives in submodules.
//!
//! At most one phase is applied per invocation. The next invocation observes
//! the effect through [`Phase::is_converged`] before anything later in the
//! sequence runs, so a phase whose effect is eventually consistent can never
//! be raced past.

pub mod bucket;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::crd::ManagedResource;
use crate::phases::Phase;
use crate::store::{ResourceId, ResourceStore};
use crate::Error;

/// What a single reconcile invocation did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record no longer exists; nothing to do
    Gone,
    /// One phase was applied; more work may remain
    Advanced {
        /// Name of the phase that was applied
        phase: &'static str,
    },
    /// Every phase reports convergence
    Converged,
    /// Cleanup ran for every phase and the finalizer marker was released
    Finalized,
    /// Deletion was requested but there was no finalizer marker to honor
    Released,
}

/// Result reported to whatever triggers reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationResult {
    /// No retry needed
    Done,
    /// A system fault occurred; retry after backoff
    Retry,
    /// The resource is gone; no action
    Gone,
}

impl From<&Result<ReconcileOutcome, Error>> for InvocationResult {
    fn from(result: &Result<ReconcileOutcome, Error>) -> Self {
        match result {
            Ok(ReconcileOutcome::Gone) => InvocationResult::Gone,
            Ok(_) => InvocationResult::Done,
            Err(_) => InvocationResult::Retry,
        }
    }
}

/// Drives an ordered phase sequence for resources of kind `K`
///
/// Phase order is fixed at construction. Prerequisites come first: the
/// finalizer registrar must precede any phase that creates external state,
/// because cleanup runs the same list in reverse.
pub struct Reconciler<K> {
    store: Arc<dyn ResourceStore<K>>,
    finalizer: String,
    phases: Vec<Arc<dyn Phase<K>>>,
}

impl<K: ManagedResource> Reconciler<K> {
    /// Create a reconciler over `phases` in the given order
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        finalizer: impl Into<String>,
        phases: Vec<Arc<dyn Phase<K>>>,
    ) -> Self {
        Self {
            store,
            finalizer: finalizer.into(),
            phases,
        }
    }

    /// The finalizer marker guarding external state
    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    /// Names of the configured phases, in order
    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    /// Run one reconcile invocation for the record identified by `id`
    #[instrument(skip(self), fields(resource = %id))]
    pub async fn reconcile(&self, id: &ResourceId) -> Result<ReconcileOutcome, Error> {
        let mut resource = match self.store.get(id).await {
            Ok(resource) => resource,
            Err(e) if e.is_not_found() => {
                debug!("resource no longer exists");
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => return Err(e),
        };

        if resource.is_deletion_requested() {
            if !resource.has_finalizer(&self.finalizer) {
                debug!("deletion requested without finalizer, nothing to clean up");
                return Ok(ReconcileOutcome::Released);
            }
            self.finalize(&mut resource).await?;
            return Ok(ReconcileOutcome::Finalized);
        }

        self.converge(&mut resource).await
    }

    /// Like [`Reconciler::reconcile`], abandoning the invocation after `deadline`
    ///
    /// Abandoning is safe at any await point: every phase re-derives its
    /// progress from observed state on the next invocation.
    pub async fn reconcile_with_deadline(
        &self,
        id: &ResourceId,
        deadline: Duration,
    ) -> Result<ReconcileOutcome, Error> {
        match tokio::time::timeout(deadline, self.reconcile(id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(resource = %id, ?deadline, "reconciliation deadline exceeded");
                Err(Error::timeout(id.to_string(), deadline))
            }
        }
    }

    async fn converge(&self, resource: &mut K) -> Result<ReconcileOutcome, Error> {
        for phase in &self.phases {
            if phase.is_converged(resource).await? {
                debug!(phase = phase.name(), "phase converged");
                continue;
            }

            info!(phase = phase.name(), "applying phase");
            phase.apply(resource).await?;
            return Ok(ReconcileOutcome::Advanced {
                phase: phase.name(),
            });
        }

        debug!("all phases converged");
        Ok(ReconcileOutcome::Converged)
    }

    async fn finalize(&self, resource: &mut K) -> Result<(), Error> {
        info!("finalizing resource");
        for phase in self.phases.iter().rev() {
            phase
                .cleanup(resource)
                .await
                .map_err(|e| Error::finalization(phase.name(), e))?;
            debug!(phase = phase.name(), "phase cleaned up");
        }
        info!("finalization complete");
        Ok(())
    }
}
