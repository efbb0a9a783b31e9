//! REST storage API adapter
//!
//! Talks to an object-storage management API exposing
//! `GET|PUT|DELETE {endpoint}/v1/buckets/{name}`. PUT is an upsert, so
//! `create` doubles as "update configuration". Buckets carry an `owner` tag;
//! DELETE sends the recorded id as `If-Match` so a bucket recreated under the
//! same name is never removed by a stale record.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use super::{BucketAdapter, BucketIdentifiers, BucketOwner, ObservedBucket};
use crate::config::AdapterConfig;
use crate::crd::{ObjectBucketSpec, StorageClass};
use crate::Error;

/// Request body for bucket upserts
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BucketRequest<'a> {
    storage_class: &'a StorageClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_size_bytes: Option<u64>,
    public_read: bool,
    owner: &'a BucketOwner,
}

impl<'a> BucketRequest<'a> {
    fn new(spec: &'a ObjectBucketSpec, owner: &'a BucketOwner) -> Self {
        Self {
            storage_class: &spec.storage_class,
            max_size_bytes: spec.max_size_bytes,
            public_read: spec.public_read,
            owner,
        }
    }
}

/// [`BucketAdapter`] over the storage service's REST API
pub struct HttpBucketAdapter {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpBucketAdapter {
    /// Build an adapter from configuration
    pub fn new(config: &AdapterConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::internal_with_context("adapter", format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn bucket_url(&self, name: &str) -> String {
        format!("{}/v1/buckets/{}", self.endpoint, name)
    }

    fn request(&self, method: reqwest::Method, name: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.bucket_url(name));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Map a non-success response status to an adapter error
fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("{status}: {body}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::CONFLICT
    {
        Error::adapter(operation, message)
    } else {
        Error::adapter_permanent(operation, message)
    }
}

fn foreign_bucket_error(existing: &ObservedBucket) -> Error {
    let owner = existing
        .owner
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    Error::adapter_permanent(
        "create",
        format!("bucket {} is owned by {owner}", existing.name),
    )
}

fn transport_error(operation: &str, err: reqwest::Error) -> Error {
    Error::adapter(operation, err.to_string())
}

#[async_trait]
impl BucketAdapter for HttpBucketAdapter {
    async fn describe(&self, spec: &ObjectBucketSpec) -> Result<Option<ObservedBucket>, Error> {
        let response = self
            .request(reqwest::Method::GET, &spec.bucket_name)
            .send()
            .await
            .map_err(|e| transport_error("describe", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(bucket = %spec.bucket_name, "bucket does not exist");
                Ok(None)
            }
            status if status.is_success() => {
                let observed = response
                    .json::<ObservedBucket>()
                    .await
                    .map_err(|e| Error::serialization(format!("invalid describe response: {e}")))?;
                Ok(Some(observed))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error("describe", status, &body))
            }
        }
    }

    async fn create(
        &self,
        spec: &ObjectBucketSpec,
        owner: &BucketOwner,
    ) -> Result<BucketIdentifiers, Error> {
        if let Some(existing) = self.describe(spec).await? {
            if existing.is_foreign_to(owner) {
                return Err(foreign_bucket_error(&existing));
            }
        }

        let response = self
            .request(reqwest::Method::PUT, &spec.bucket_name)
            .json(&BucketRequest::new(spec, owner))
            .send()
            .await
            .map_err(|e| transport_error("create", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("create", status, &body));
        }

        let observed = response
            .json::<ObservedBucket>()
            .await
            .map_err(|e| Error::serialization(format!("invalid create response: {e}")))?;
        info!(bucket = %observed.name, id = %observed.id, "bucket created or updated");

        Ok(BucketIdentifiers {
            name: observed.name,
            id: Some(observed.id),
            endpoint: observed.endpoint,
        })
    }

    async fn delete(&self, ids: &BucketIdentifiers) -> Result<(), Error> {
        let mut request = self.request(reqwest::Method::DELETE, &ids.name);
        if let Some(id) = &ids.id {
            request = request.header(reqwest::header::IF_MATCH, id.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("delete", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(bucket = %ids.name, "bucket already absent");
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => {
                debug!(bucket = %ids.name, id = ?ids.id, "bucket was replaced, leaving it in place");
                Ok(())
            }
            status if status.is_success() => {
                info!(bucket = %ids.name, "bucket deleted");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error("delete", status, &body))
            }
        }
    }
}
