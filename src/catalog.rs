use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::ResourceId;

/// Catalog record for one loanable resource. Owned by the catalog
/// collaborator; the core reads it only for history/desk-view enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub id: ResourceId,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published: i32,
    pub cover_url: Option<String>,
}

/// The external catalog the booking core consults. Catalog CRUD lives
/// elsewhere; the core only needs existence checks, metadata lookups, and
/// the id universe that availability filters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn exists(&self, id: ResourceId) -> bool;
    async fn metadata(&self, id: ResourceId) -> Option<ResourceMeta>;
    /// Batch lookup for history/desk joins. Unknown ids are simply absent
    /// from the result.
    async fn metadata_batch(&self, ids: &[ResourceId]) -> Vec<ResourceMeta>;
    async fn list_ids(&self) -> Vec<ResourceId>;
}

/// In-process catalog backing the daemon and the tests.
pub struct MemoryCatalog {
    entries: DashMap<ResourceId, ResourceMeta>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn add(&self, meta: ResourceMeta) {
        self.entries.insert(meta.id, meta);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn exists(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    async fn metadata(&self, id: ResourceId) -> Option<ResourceMeta> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    async fn metadata_batch(&self, ids: &[ResourceId]) -> Vec<ResourceMeta> {
        ids.iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.value().clone()))
            .collect()
    }

    async fn list_ids(&self) -> Vec<ResourceId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}
