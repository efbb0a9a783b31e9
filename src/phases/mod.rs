//! Convergence phases
//!
//! A [`Phase`] is one idempotent step towards the declared state of a
//! resource. The reconciler holds an ordered list of phases: it walks them
//! forward to converge a live resource and backward to release external state
//! once deletion is requested.
//!
//! Phases own no state beyond their collaborators. Whether a phase still has
//! work to do is always derived from [`Phase::is_converged`], never from a
//! progress pointer, so a reconcile may be interrupted at any point and
//! resumed by simply invoking it again.

mod allocator;
mod finalizer;

pub use allocator::ResourceAllocator;
pub use finalizer::FinalizerRegistrar;

use async_trait::async_trait;

use crate::Error;

/// One ordered, idempotent unit of convergence and cleanup
#[async_trait]
pub trait Phase<K>: Send + Sync {
    /// Stable name used in logs, events and finalization errors
    fn name(&self) -> &'static str;

    /// Reports whether this phase's goal already holds for `resource`
    ///
    /// Must have no side effects and return the same answer when called
    /// twice on an unchanged resource and unchanged external state.
    async fn is_converged(&self, resource: &K) -> Result<bool, Error>;

    /// Performs the convergence action
    ///
    /// May call external systems and persist the resource; on success
    /// `resource` holds the stored record. Safe to retry after a partial
    /// failure.
    async fn apply(&self, resource: &mut K) -> Result<(), Error>;

    /// Undoes this phase's external effects
    ///
    /// Must succeed against a resource that was never (or only partially)
    /// applied.
    async fn cleanup(&self, resource: &mut K) -> Result<(), Error>;
}
