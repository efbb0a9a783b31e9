//! Custom Resource Definitions for the connectors
//!
//! This module contains the CRDs reconciled and validated by the operator, and
//! the [`ManagedResource`] bound the reconciliation engine works against.

mod access_key;
mod bucket;
mod types;

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use access_key::{AccessKey, AccessKeySpec, AccessKeyStatus};
pub use bucket::{ObjectBucket, ObjectBucketSpec, ObjectBucketStatus};
pub use types::{BucketPhase, Condition, ConditionStatus, StorageClass};

/// A namespaced Kubernetes object whose external side effects are driven by
/// the reconciliation engine.
///
/// Implemented for every namespaced resource with a static type; the provided
/// methods read the finalizer set and the deletion marker from object metadata.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Returns true if the given finalizer marker is present
    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// Returns true once deletion of the record has been requested
    fn is_deletion_requested(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn bucket(finalizers: Option<Vec<String>>, deleting: bool) -> ObjectBucket {
        ObjectBucket {
            metadata: ObjectMeta {
                name: Some("photos".to_string()),
                namespace: Some("default".to_string()),
                finalizers,
                deletion_timestamp: deleting.then(|| Time(chrono::Utc::now())),
                ..Default::default()
            },
            spec: ObjectBucketSpec {
                bucket_name: "photos".to_string(),
                access_key_ref: "photos-key".to_string(),
                storage_class: StorageClass::Standard,
                max_size_bytes: None,
                public_read: false,
            },
            status: None,
        }
    }

    #[test]
    fn test_has_finalizer() {
        let b = bucket(Some(vec!["a/b".to_string()]), false);
        assert!(b.has_finalizer("a/b"));
        assert!(!b.has_finalizer("a/c"));
        assert!(!bucket(None, false).has_finalizer("a/b"));
    }

    #[test]
    fn test_deletion_requested_follows_deletion_timestamp() {
        assert!(!bucket(None, false).is_deletion_requested());
        assert!(bucket(None, true).is_deletion_requested());
    }
}
