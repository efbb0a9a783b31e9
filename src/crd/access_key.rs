//! AccessKey Custom Resource Definition
//!
//! A static access key bound to a cloud service account. ObjectBuckets refer to
//! an AccessKey by name; the bound service account may never change.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for an AccessKey
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "connectors.lattice.dev",
    version = "v1alpha1",
    kind = "AccessKey",
    plural = "accesskeys",
    shortname = "ak",
    status = "AccessKeyStatus",
    namespaced,
    printcolumn = r#"{"name":"ServiceAccount","type":"string","jsonPath":".spec.serviceAccountId"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeySpec {
    /// Service account the key is issued for (immutable)
    pub service_account_id: String,
}

/// Status for an AccessKey
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyStatus {
    /// Identifier of the issued key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Secret holding the key material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}
