//! External bucket allocation phase

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Phase;
use crate::adapter::{BucketAdapter, BucketIdentifiers, BucketOwner, ObservedBucket};
use crate::crd::{BucketPhase, Condition, ConditionStatus, ObjectBucket, ObjectBucketStatus};
use crate::store::ResourceStore;
use crate::Error;

/// Creates the external bucket and records its identifiers in status
///
/// Bucket names are shared across namespaces, so a bucket already tagged with
/// another record's owner is refused on convergence and left alone on cleanup.
pub struct ResourceAllocator {
    store: Arc<dyn ResourceStore<ObjectBucket>>,
    adapter: Arc<dyn BucketAdapter>,
}

impl ResourceAllocator {
    /// Create an allocator persisting through `store` and allocating through `adapter`
    pub fn new(store: Arc<dyn ResourceStore<ObjectBucket>>, adapter: Arc<dyn BucketAdapter>) -> Self {
        Self { store, adapter }
    }
}

fn recorded_id(bucket: &ObjectBucket) -> Option<&str> {
    bucket.status.as_ref().and_then(|s| s.bucket_id.as_deref())
}

fn foreign_bucket(observed: &ObservedBucket, owner: &BucketOwner) -> Error {
    let holder = observed
        .owner
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    Error::adapter_permanent(
        "describe",
        format!(
            "bucket {} is owned by {holder}, not {owner}",
            observed.name
        ),
    )
}

/// Returns true if `observed` was allocated for `bucket`
///
/// Either the service reports this record as the owner, or the bucket is
/// untagged and its id is the one recorded in status.
fn allocated_for(observed: &ObservedBucket, bucket: &ObjectBucket, owner: &BucketOwner) -> bool {
    match &observed.owner {
        Some(tagged) => tagged.is_same_record(owner),
        None => recorded_id(bucket) == Some(observed.id.as_str()),
    }
}

#[async_trait]
impl Phase<ObjectBucket> for ResourceAllocator {
    fn name(&self) -> &'static str {
        "ResourceAllocator"
    }

    async fn is_converged(&self, bucket: &ObjectBucket) -> Result<bool, Error> {
        let Some(observed) = self.adapter.describe(&bucket.spec).await? else {
            return Ok(false);
        };

        let owner = BucketOwner::of(bucket);
        if observed.is_foreign_to(&owner) {
            return Err(foreign_bucket(&observed, &owner));
        }

        Ok(observed.matches(&bucket.spec) && recorded_id(bucket) == Some(observed.id.as_str()))
    }

    async fn apply(&self, bucket: &mut ObjectBucket) -> Result<(), Error> {
        let owner = BucketOwner::of(bucket);
        let ids = self.adapter.create(&bucket.spec, &owner).await?;
        info!(bucket = %ids.name, id = ?ids.id, %owner, "bucket allocated");

        let generation = bucket.metadata.generation;
        let status = bucket
            .status
            .take()
            .unwrap_or_default()
            .phase(BucketPhase::Ready)
            .message("bucket is allocated")
            .condition(Condition::new(
                "Ready",
                ConditionStatus::True,
                "Allocated",
                format!("bucket {} is allocated", ids.name),
            ));

        bucket.status = Some(ObjectBucketStatus {
            bucket_id: ids.id,
            endpoint: ids.endpoint,
            observed_generation: generation,
            ..status
        });

        *bucket = self.store.update_status(bucket).await?;
        Ok(())
    }

    async fn cleanup(&self, bucket: &mut ObjectBucket) -> Result<(), Error> {
        let name = &bucket.spec.bucket_name;
        let Some(observed) = self.adapter.describe(&bucket.spec).await? else {
            debug!(bucket = %name, "bucket already absent");
            return Ok(());
        };

        let owner = BucketOwner::of(bucket);
        if !allocated_for(&observed, bucket, &owner) {
            warn!(
                bucket = %name,
                id = %observed.id,
                recorded = ?recorded_id(bucket),
                "bucket was not allocated for this record, leaving it in place"
            );
            return Ok(());
        }

        let ids = BucketIdentifiers {
            name: observed.name,
            id: Some(observed.id),
            endpoint: observed.endpoint,
        };
        debug!(bucket = %ids.name, id = ?ids.id, "releasing bucket");
        self.adapter.delete(&ids).await?;
        info!(bucket = %ids.name, "bucket released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{InMemoryBucketAdapter, MockBucketAdapter};
    use crate::store::ResourceId;
    use crate::testing::{sample_bucket, InMemoryStore};
    use mockall::predicate::eq;

    fn owner(namespace: &str) -> BucketOwner {
        BucketOwner {
            namespace: namespace.to_string(),
            name: "photos".to_string(),
            uid: None,
        }
    }

    fn observed(bucket: &ObjectBucket, id: &str) -> ObservedBucket {
        ObservedBucket {
            id: id.to_string(),
            name: bucket.spec.bucket_name.clone(),
            storage_class: bucket.spec.storage_class.clone(),
            max_size_bytes: bucket.spec.max_size_bytes,
            public_read: bucket.spec.public_read,
            endpoint: Some("https://photos.storage.example.com".to_string()),
            owner: Some(owner("default")),
        }
    }

    fn allocated(mut bucket: ObjectBucket, id: &str) -> ObjectBucket {
        bucket.status = Some(ObjectBucketStatus {
            bucket_id: Some(id.to_string()),
            ..Default::default()
        });
        bucket
    }

    fn allocator(store: Arc<InMemoryStore<ObjectBucket>>, adapter: MockBucketAdapter) -> ResourceAllocator {
        ResourceAllocator::new(store, Arc::new(adapter))
    }

    #[tokio::test]
    async fn test_not_converged_when_bucket_absent() {
        let bucket = sample_bucket("photos");
        let mut adapter = MockBucketAdapter::new();
        adapter.expect_describe().returning(|_| Ok(None));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        assert!(!phase.is_converged(&bucket).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_converged_when_configuration_drifted() {
        let bucket = allocated(sample_bucket("photos"), "b-1");
        let mut drifted = observed(&bucket, "b-1");
        drifted.public_read = true;

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(drifted.clone())));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        assert!(!phase.is_converged(&bucket).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_converged_until_identifier_recorded() {
        let bucket = sample_bucket("photos");
        let existing = observed(&bucket, "b-1");

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(existing.clone())));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        assert!(!phase.is_converged(&bucket).await.unwrap());
    }

    #[tokio::test]
    async fn test_converged_check_is_repeatable() {
        let bucket = allocated(sample_bucket("photos"), "b-1");
        let existing = observed(&bucket, "b-1");

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .times(2)
            .returning(move |_| Ok(Some(existing.clone())));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        assert!(phase.is_converged(&bucket).await.unwrap());
        assert!(phase.is_converged(&bucket).await.unwrap());
    }

    #[tokio::test]
    async fn test_bucket_owned_by_another_record_is_refused() {
        let bucket = sample_bucket("photos");
        let mut taken = observed(&bucket, "b-1");
        taken.owner = Some(owner("media"));

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(taken.clone())));
        adapter.expect_create().never();

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        let err = phase.is_converged(&bucket).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("owned by media/photos, not default/photos"));
    }

    #[tokio::test]
    async fn test_describe_failure_propagates() {
        let bucket = sample_bucket("photos");
        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(|_| Err(Error::adapter("describe", "connection refused")));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        let err = phase.is_converged(&bucket).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_apply_records_identifiers_in_status() {
        let store = Arc::new(InMemoryStore::with(sample_bucket("photos")));
        let id = ResourceId::new("default", "photos");

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_create()
            .withf(|_, owner| owner.to_string() == "default/photos")
            .times(1)
            .returning(|spec, _| {
                Ok(BucketIdentifiers {
                    name: spec.bucket_name.clone(),
                    id: Some("b-42".to_string()),
                    endpoint: Some("https://photos.storage.example.com".to_string()),
                })
            });

        let phase = allocator(store.clone(), adapter);
        let mut bucket = store.current(&id).unwrap();
        phase.apply(&mut bucket).await.unwrap();

        let status = store.current(&id).unwrap().status.unwrap();
        assert_eq!(status.bucket_id.as_deref(), Some("b-42"));
        assert_eq!(status.phase, BucketPhase::Ready);
        assert_eq!(status.observed_generation, Some(1));
        assert!(status
            .conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == ConditionStatus::True));
    }

    #[tokio::test]
    async fn test_reapply_keeps_ready_transition_time() {
        let store = Arc::new(InMemoryStore::with(sample_bucket("photos")));
        let id = ResourceId::new("default", "photos");
        let adapter = Arc::new(InMemoryBucketAdapter::new());
        let phase = ResourceAllocator::new(store.clone(), adapter);

        let mut bucket = store.current(&id).unwrap();
        phase.apply(&mut bucket).await.unwrap();
        let first = bucket.status.clone().unwrap().conditions[0].last_transition_time;

        bucket.spec.public_read = true;
        phase.apply(&mut bucket).await.unwrap();

        let status = store.current(&id).unwrap().status.unwrap();
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, first);
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_status_untouched() {
        let store = Arc::new(InMemoryStore::with(sample_bucket("photos")));
        let id = ResourceId::new("default", "photos");

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_create()
            .returning(|_, _| Err(Error::adapter("create", "503 Service Unavailable")));

        let phase = allocator(store.clone(), adapter);
        let mut bucket = store.current(&id).unwrap();
        assert!(phase.apply(&mut bucket).await.is_err());

        assert!(store.current(&id).unwrap().status.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_observed_bucket_by_id() {
        let mut bucket = allocated(sample_bucket("photos"), "b-1");
        let existing = observed(&bucket, "b-1");

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(existing.clone())));
        adapter
            .expect_delete()
            .with(eq(BucketIdentifiers {
                name: "photos".to_string(),
                id: Some("b-1".to_string()),
                endpoint: Some("https://photos.storage.example.com".to_string()),
            }))
            .times(1)
            .returning(|_| Ok(()));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        phase.cleanup(&mut bucket).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_of_absent_bucket_deletes_nothing() {
        let mut bucket = allocated(sample_bucket("photos"), "b-1");

        let mut adapter = MockBucketAdapter::new();
        adapter.expect_describe().returning(|_| Ok(None));
        adapter.expect_delete().never();

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        phase.cleanup(&mut bucket).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_leaves_foreign_bucket_in_place() {
        let mut bucket = allocated(sample_bucket("photos"), "b-1");
        let mut taken = observed(&bucket, "b-1");
        taken.owner = Some(owner("media"));

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(taken.clone())));
        adapter.expect_delete().never();

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        phase.cleanup(&mut bucket).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_leaves_untagged_bucket_with_other_id() {
        let mut bucket = allocated(sample_bucket("photos"), "b-1");
        let mut replaced = observed(&bucket, "b-7");
        replaced.owner = None;

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(replaced.clone())));
        adapter.expect_delete().never();

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        phase.cleanup(&mut bucket).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_releases_own_bucket_before_id_was_recorded() {
        let mut bucket = sample_bucket("photos");
        let existing = observed(&bucket, "b-1");

        let mut adapter = MockBucketAdapter::new();
        adapter
            .expect_describe()
            .returning(move |_| Ok(Some(existing.clone())));
        adapter
            .expect_delete()
            .withf(|ids| ids.id.as_deref() == Some("b-1"))
            .times(1)
            .returning(|_| Ok(()));

        let phase = allocator(Arc::new(InMemoryStore::new()), adapter);
        phase.cleanup(&mut bucket).await.unwrap();
    }
}
