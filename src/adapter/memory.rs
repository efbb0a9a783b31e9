//! Process-local storage adapter for development clusters and tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BucketAdapter, BucketIdentifiers, BucketOwner, ObservedBucket};
use crate::crd::ObjectBucketSpec;
use crate::Error;

/// [`BucketAdapter`] that keeps buckets in memory
#[derive(Default)]
pub struct InMemoryBucketAdapter {
    buckets: Mutex<BTreeMap<String, ObservedBucket>>,
    next_id: AtomicU64,
}

impl InMemoryBucketAdapter {
    /// Create an empty adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket with the given name, if it exists
    pub fn get(&self, name: &str) -> Option<ObservedBucket> {
        self.lock().get(name).cloned()
    }

    /// Number of buckets currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no buckets exist
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ObservedBucket>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BucketAdapter for InMemoryBucketAdapter {
    async fn describe(&self, spec: &ObjectBucketSpec) -> Result<Option<ObservedBucket>, Error> {
        Ok(self.get(&spec.bucket_name))
    }

    async fn create(
        &self,
        spec: &ObjectBucketSpec,
        owner: &BucketOwner,
    ) -> Result<BucketIdentifiers, Error> {
        let mut buckets = self.lock();
        let id = match buckets.get(&spec.bucket_name) {
            Some(existing) if existing.is_foreign_to(owner) => {
                return Err(Error::adapter_permanent(
                    "create",
                    format!(
                        "bucket {} is owned by {}",
                        spec.bucket_name,
                        existing.owner.as_ref().map(ToString::to_string).unwrap_or_default()
                    ),
                ));
            }
            Some(existing) => existing.id.clone(),
            None => format!("bucket-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let endpoint = format!("memory://{}", spec.bucket_name);

        buckets.insert(
            spec.bucket_name.clone(),
            ObservedBucket {
                id: id.clone(),
                name: spec.bucket_name.clone(),
                storage_class: spec.storage_class.clone(),
                max_size_bytes: spec.max_size_bytes,
                public_read: spec.public_read,
                endpoint: Some(endpoint.clone()),
                owner: Some(owner.clone()),
            },
        );

        Ok(BucketIdentifiers {
            name: spec.bucket_name.clone(),
            id: Some(id),
            endpoint: Some(endpoint),
        })
    }

    async fn delete(&self, ids: &BucketIdentifiers) -> Result<(), Error> {
        let mut buckets = self.lock();
        // a bucket recreated under the same name has a new id and is left alone
        let same_bucket = match (buckets.get(&ids.name), &ids.id) {
            (Some(existing), Some(id)) => &existing.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if same_bucket {
            buckets.remove(&ids.name);
        }
        Ok(())
    }
}
