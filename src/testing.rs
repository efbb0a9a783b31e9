//! Test fixtures shared by unit tests across modules

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::{Resource, ResourceExt};

use crate::crd::{ManagedResource, ObjectBucket, ObjectBucketSpec, StorageClass};
use crate::store::{ResourceId, ResourceStore};
use crate::Error;

/// A live bucket in the `default` namespace with no finalizers and no status
pub fn sample_bucket(name: &str) -> ObjectBucket {
    ObjectBucket {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: ObjectBucketSpec {
            bucket_name: name.to_string(),
            access_key_ref: format!("{name}-key"),
            storage_class: StorageClass::Standard,
            max_size_bytes: Some(1024),
            public_read: false,
        },
        status: None,
    }
}

/// Mark a record as deleted, the way the API server does on DELETE
pub fn mark_deleted<K: Resource>(resource: &mut K) {
    resource.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
}

/// In-memory [`ResourceStore`] that mimics the API server closely enough for
/// reconciliation tests: resourceVersion is checked and bumped on every write,
/// and a record being deleted disappears once its last finalizer is removed.
pub struct InMemoryStore<K> {
    records: Mutex<BTreeMap<String, K>>,
    writes: Mutex<u32>,
}

impl<K: ManagedResource> InMemoryStore<K> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(0),
        }
    }

    pub fn with(resource: K) -> Self {
        let store = Self::new();
        store.insert(resource);
        store
    }

    pub fn insert(&self, mut resource: K) {
        if resource.meta().resource_version.is_none() {
            resource.meta_mut().resource_version = Some("1".to_string());
        }
        let id = ResourceId::of(&resource).expect("test resource must be namespaced");
        self.records
            .lock()
            .expect("mutex should not be poisoned")
            .insert(id.to_string(), resource);
    }

    pub fn current(&self, id: &ResourceId) -> Option<K> {
        self.records
            .lock()
            .expect("mutex should not be poisoned")
            .get(&id.to_string())
            .cloned()
    }

    /// Act as another writer: bump the stored record's resourceVersion and
    /// label it, so copies read earlier become stale
    pub fn touch(&self, id: &ResourceId) {
        let mut records = self.records.lock().expect("mutex should not be poisoned");
        if let Some(record) = records.get_mut(&id.to_string()) {
            let version: u64 = record
                .resource_version()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            record.meta_mut().resource_version = Some((version + 1).to_string());
            record
                .labels_mut()
                .insert("touched-by".to_string(), "other-writer".to_string());
        }
    }

    pub fn write_count(&self) -> u32 {
        *self.writes.lock().expect("mutex should not be poisoned")
    }

    fn write(&self, resource: &K) -> Result<K, Error> {
        let id = ResourceId::of(resource)?;
        let kind = K::kind(&()).to_string();
        let mut records = self.records.lock().expect("mutex should not be poisoned");

        let stored = records
            .get(&id.to_string())
            .ok_or_else(|| Error::not_found(kind.clone(), id.to_string()))?;
        if stored.resource_version() != resource.resource_version() {
            return Err(Error::conflict(kind, id.to_string()));
        }

        let mut next = resource.clone();
        let version: u64 = stored
            .resource_version()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        next.meta_mut().resource_version = Some((version + 1).to_string());
        *self.writes.lock().expect("mutex should not be poisoned") += 1;

        if next.is_deletion_requested() && next.finalizers().is_empty() {
            records.remove(&id.to_string());
        } else {
            records.insert(id.to_string(), next.clone());
        }
        Ok(next)
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for InMemoryStore<K> {
    async fn get(&self, id: &ResourceId) -> Result<K, Error> {
        self.current(id)
            .ok_or_else(|| Error::not_found(K::kind(&()).to_string(), id.to_string()))
    }

    async fn update(&self, resource: &K) -> Result<K, Error> {
        self.write(resource)
    }

    async fn update_status(&self, resource: &K) -> Result<K, Error> {
        self.write(resource)
    }
}
