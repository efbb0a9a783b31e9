//! ObjectBucket Custom Resource Definition
//!
//! An ObjectBucket declares a bucket in an external object-storage service.
//! The bucket name and the access key it is managed with are fixed at
//! creation; storage class, size quota and public access may change.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BucketPhase, Condition, StorageClass};

/// Specification for an ObjectBucket
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "connectors.lattice.dev",
    version = "v1alpha1",
    kind = "ObjectBucket",
    plural = "objectbuckets",
    shortname = "ob",
    status = "ObjectBucketStatus",
    namespaced,
    printcolumn = r#"{"name":"Bucket","type":"string","jsonPath":".spec.bucketName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketSpec {
    /// Name of the bucket in the storage service (immutable)
    pub bucket_name: String,

    /// Name of the AccessKey the bucket is managed with (immutable)
    pub access_key_ref: String,

    /// Storage class for objects in the bucket
    #[serde(default)]
    pub storage_class: StorageClass,

    /// Size quota in bytes; unlimited when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,

    /// Whether anonymous clients may read objects
    #[serde(default)]
    pub public_read: bool,
}

/// Status for an ObjectBucket
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketStatus {
    /// Current phase of the bucket
    #[serde(default)]
    pub phase: BucketPhase,

    /// Identifier assigned by the storage service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,

    /// Endpoint clients use to reach the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Generation of the spec the bucket was last allocated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the bucket state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ObjectBucketStatus {
    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: BucketPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Add a condition and return self for chaining
    ///
    /// Replaces any condition of the same type. The previous transition time
    /// is kept when the status did not change.
    pub fn condition(mut self, mut condition: Condition) -> Self {
        if let Some(previous) = self
            .conditions
            .iter()
            .find(|c| c.type_ == condition.type_ && c.status == condition.status)
        {
            condition.last_transition_time = previous.last_transition_time;
        }
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }
}
