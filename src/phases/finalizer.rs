//! Finalizer registration phase
//!
//! Must be the first configured phase: the marker is added before any other
//! phase creates external state, and removed only after every later phase
//! has cleaned up (cleanup walks phases in reverse).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::Phase;
use crate::crd::ManagedResource;
use crate::store::ResourceStore;
use crate::Error;

/// Adds and removes the finalizer marker on a resource
pub struct FinalizerRegistrar<K> {
    store: Arc<dyn ResourceStore<K>>,
    finalizer: String,
}

impl<K: ManagedResource> FinalizerRegistrar<K> {
    /// Create a registrar for the given marker
    pub fn new(store: Arc<dyn ResourceStore<K>>, finalizer: impl Into<String>) -> Self {
        Self {
            store,
            finalizer: finalizer.into(),
        }
    }
}

#[async_trait]
impl<K: ManagedResource> Phase<K> for FinalizerRegistrar<K> {
    fn name(&self) -> &'static str {
        "FinalizerRegistrar"
    }

    async fn is_converged(&self, resource: &K) -> Result<bool, Error> {
        Ok(resource.has_finalizer(&self.finalizer))
    }

    async fn apply(&self, resource: &mut K) -> Result<(), Error> {
        if !resource.has_finalizer(&self.finalizer) {
            resource
                .meta_mut()
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(self.finalizer.clone());
        }
        *resource = self.store.update(resource).await?;
        info!(finalizer = %self.finalizer, "finalizer added");
        Ok(())
    }

    async fn cleanup(&self, resource: &mut K) -> Result<(), Error> {
        if !resource.has_finalizer(&self.finalizer) {
            debug!(finalizer = %self.finalizer, "finalizer already removed");
            return Ok(());
        }

        if let Some(finalizers) = resource.meta_mut().finalizers.as_mut() {
            finalizers.retain(|f| f != &self.finalizer);
        }

        match self.store.update(resource).await {
            Ok(stored) => *resource = stored,
            // the store reclaims the record as soon as the last marker is gone
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        info!(finalizer = %self.finalizer, "finalizer removed");
        Ok(())
    }
}
