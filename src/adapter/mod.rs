//! External object-storage adapter
//!
//! The [`BucketAdapter`] trait is the only way phases touch the storage
//! service. Every operation is idempotent: creating a bucket that already
//! exists with the same configuration returns its identifiers, and deleting a
//! bucket that is already gone succeeds.
//!
//! Bucket names are global to the storage service while records are
//! namespaced, so every bucket is tagged with the [`BucketOwner`] that created
//! it. A bucket tagged with a different owner is never adopted or deleted.

mod http;
mod memory;

pub use http::HttpBucketAdapter;
pub use memory::InMemoryBucketAdapter;

use std::fmt;

use async_trait::async_trait;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::crd::{ObjectBucket, ObjectBucketSpec, StorageClass};
use crate::Error;

/// The record a bucket was created for
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketOwner {
    /// Namespace of the owning record
    pub namespace: String,
    /// Name of the owning record
    pub name: String,
    /// UID of the owning record, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl BucketOwner {
    /// Owner tag for buckets created on behalf of `bucket`
    pub fn of(bucket: &ObjectBucket) -> Self {
        Self {
            namespace: bucket.namespace().unwrap_or_default(),
            name: bucket.name_any(),
            uid: bucket.uid(),
        }
    }

    /// Returns true if `other` identifies the same record
    ///
    /// UIDs are compared only when both sides carry one.
    pub fn is_same_record(&self, other: &BucketOwner) -> bool {
        self.namespace == other.namespace
            && self.name == other.name
            && match (&self.uid, &other.uid) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Display for BucketOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A bucket as reported by the storage service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObservedBucket {
    /// Identifier assigned by the storage service
    pub id: String,
    /// Bucket name
    pub name: String,
    /// Storage class in effect
    pub storage_class: StorageClass,
    /// Size quota in bytes, if any
    #[serde(default)]
    pub max_size_bytes: Option<u64>,
    /// Whether anonymous reads are allowed
    #[serde(default)]
    pub public_read: bool,
    /// Endpoint clients use to reach the bucket
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Record the bucket was created for; unset for buckets created out of band
    #[serde(default)]
    pub owner: Option<BucketOwner>,
}

impl ObservedBucket {
    /// Returns true if the observed configuration matches the declared spec
    pub fn matches(&self, spec: &ObjectBucketSpec) -> bool {
        self.name == spec.bucket_name
            && self.storage_class == spec.storage_class
            && self.max_size_bytes == spec.max_size_bytes
            && self.public_read == spec.public_read
    }

    /// Returns true if the bucket is tagged with an owner other than `owner`
    ///
    /// Untagged buckets are not foreign: they may be adopted.
    pub fn is_foreign_to(&self, owner: &BucketOwner) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|tagged| !tagged.is_same_record(owner))
    }
}

/// Identifiers needed to address a bucket in the storage service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketIdentifiers {
    /// Bucket name (always known from the spec)
    pub name: String,
    /// Service-assigned identifier, known once the bucket has been created
    #[serde(default)]
    pub id: Option<String>,
    /// Endpoint clients use to reach the bucket
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Operations against the external storage service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BucketAdapter: Send + Sync {
    /// Look up the bucket described by `spec`; `None` if it does not exist
    async fn describe(&self, spec: &ObjectBucketSpec) -> Result<Option<ObservedBucket>, Error>;

    /// Create the bucket for `owner`, or bring an existing one to the declared
    /// configuration
    ///
    /// Fails with a non-retryable error if the bucket belongs to another owner.
    async fn create(
        &self,
        spec: &ObjectBucketSpec,
        owner: &BucketOwner,
    ) -> Result<BucketIdentifiers, Error>;

    /// Delete the bucket; succeeds if it is already absent
    async fn delete(&self, ids: &BucketIdentifiers) -> Result<(), Error>;
}
