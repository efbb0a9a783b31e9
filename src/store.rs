//! Resource store abstraction
//!
//! Phases and the reconciler read and persist resource records through
//! [`ResourceStore`], never through a raw client. The production store is
//! backed by the Kubernetes API; tests substitute an in-memory one.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

use crate::crd::ManagedResource;
use crate::Error;

/// Field manager used for every write issued by the operator
pub const FIELD_MANAGER: &str = "lattice-connector";

/// Unique namespaced identifier of a resource record
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Namespace of the record
    pub namespace: String,
    /// Name of the record
    pub name: String,
}

impl ResourceId {
    /// Create an identifier from a namespace and a name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Derive the identifier of an existing object
    pub fn of<K: Resource>(resource: &K) -> Result<Self, Error> {
        let namespace = resource.namespace().ok_or_else(|| {
            Error::internal_with_context("store", "namespaced resource has no namespace")
        })?;
        Ok(Self::new(namespace, resource.name_any()))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read/write access to resource records of kind `K`
///
/// Implementations must report a missing record as [`Error::NotFound`] and a
/// stale write as [`Error::Conflict`] so callers can tell them apart from
/// other failures.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Load the current record
    async fn get(&self, id: &ResourceId) -> Result<K, Error>;

    /// Persist metadata and spec (e.g. finalizers), returning the stored record
    async fn update(&self, resource: &K) -> Result<K, Error>;

    /// Persist the status subresource, returning the stored record
    async fn update_status(&self, resource: &K) -> Result<K, Error>;
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    /// Create a store using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K: ManagedResource> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Classify a kube error for the record identified by `id`
fn classify<K: ManagedResource>(err: kube::Error, id: &ResourceId) -> Error {
    let kind = K::kind(&()).to_string();
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(kind, id.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(kind, id.to_string()),
        other => other.into(),
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, id: &ResourceId) -> Result<K, Error> {
        self.api(&id.namespace)
            .get(&id.name)
            .await
            .map_err(|e| classify::<K>(e, id))
    }

    async fn update(&self, resource: &K) -> Result<K, Error> {
        let id = ResourceId::of(resource)?;
        // replace carries metadata.resourceVersion, so a stale copy is rejected with 409
        let stored = self
            .api(&id.namespace)
            .replace(&id.name, &PostParams::default(), resource)
            .await
            .map_err(|e| classify::<K>(e, &id))?;
        debug!(resource = %id, "record updated");
        Ok(stored)
    }

    async fn update_status(&self, resource: &K) -> Result<K, Error> {
        let id = ResourceId::of(resource)?;
        let value = serde_json::to_value(resource)?;
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": resource.resource_version() },
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });

        let stored = self
            .api(&id.namespace)
            .patch_status(
                &id.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| classify::<K>(e, &id))?;
        debug!(resource = %id, "status updated");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ObjectBucket;
    use crate::testing::{sample_bucket, InMemoryStore};
    use kube::core::ErrorResponse;
    use rstest::rstest;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("objectbuckets.connectors.lattice.dev \"photos\": {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_resource_id_display() {
        assert_eq!(ResourceId::new("default", "photos").to_string(), "default/photos");
    }

    #[test]
    fn test_resource_id_of_namespaced_object() {
        let bucket = sample_bucket("photos");
        let id = ResourceId::of(&bucket).unwrap();
        assert_eq!(id, ResourceId::new("default", "photos"));
    }

    #[test]
    fn test_resource_id_requires_namespace() {
        let mut bucket = sample_bucket("photos");
        bucket.metadata.namespace = None;
        assert!(ResourceId::of(&bucket).is_err());
    }

    #[test]
    fn test_classify_missing_record_as_not_found() {
        let id = ResourceId::new("default", "photos");
        let err = classify::<ObjectBucket>(api_error(404, "NotFound"), &id);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "ObjectBucket default/photos not found");
    }

    #[test]
    fn test_classify_stale_write_as_conflict() {
        let id = ResourceId::new("default", "photos");
        let err = classify::<ObjectBucket>(api_error(409, "Conflict"), &id);
        assert!(err.is_conflict());
        assert!(err.is_retryable());
    }

    #[rstest]
    #[case::server_error(500, true)]
    #[case::unprocessable(422, false)]
    #[case::forbidden(403, false)]
    fn test_classify_other_api_errors_keep_kube_error(#[case] code: u16, #[case] retryable: bool) {
        let id = ResourceId::new("default", "photos");
        let err = classify::<ObjectBucket>(api_error(code, "Other"), &id);
        assert!(matches!(err, Error::Kube { .. }));
        assert_eq!(err.is_retryable(), retryable);
    }

    #[tokio::test]
    async fn test_stale_copy_write_is_conflict() {
        let store = InMemoryStore::with(sample_bucket("photos"));
        let id = ResourceId::new("default", "photos");

        let stale = store.get(&id).await.unwrap();
        store.touch(&id);

        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.write_count(), 0);

        let fresh = store.get(&id).await.unwrap();
        assert!(store.update(&fresh).await.is_ok());
    }
}
