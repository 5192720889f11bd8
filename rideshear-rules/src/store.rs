use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::document::{Document, Fields};
use crate::path::DocumentPath;
use crate::resolver::{DocumentResolver, ResolverError};

type DocumentMap = HashMap<DocumentPath, Fields>;

/// In-memory document store used by the dry-run service, the CLI and the
/// test harness. Stands in for the external storage engine.
///
/// The map sits behind its own `Arc`: snapshots share it, and the first
/// write after a snapshot copies it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Arc<DocumentMap>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &DocumentPath) -> Option<Document> {
        self.inner
            .read()
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone()))
    }

    /// Inserts or replaces a document.
    pub fn put(&self, path: DocumentPath, fields: Fields) {
        Arc::make_mut(&mut *self.inner.write()).insert(path, fields);
    }

    pub fn delete(&self, path: &DocumentPath) -> Option<Fields> {
        let mut inner = self.inner.write();
        if !inner.contains_key(path) {
            return None;
        }
        Arc::make_mut(&mut *inner).remove(path)
    }

    pub fn clear(&self) {
        *self.inner.write() = Arc::default();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Documents directly inside the given collection path, sorted by id.
    pub fn list(&self, collection: &str) -> Vec<Document> {
        let collection = collection.trim_matches('/');
        let inner = self.inner.read();
        let mut documents: Vec<Document> = inner
            .iter()
            .filter(|(path, _)| path.collection_path() == collection)
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect();
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        documents
    }

    /// Frozen view of the current contents. Every fetch made through the
    /// snapshot observes the same point in time.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            documents: Arc::clone(&*self.inner.read()),
        }
    }
}

#[async_trait]
impl DocumentResolver for InMemoryStore {
    async fn resolve(&self, path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
        Ok(self.get(path))
    }
}

/// Read-only view produced by [`InMemoryStore::snapshot`].
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    documents: Arc<DocumentMap>,
}

impl StoreSnapshot {
    pub fn get(&self, path: &DocumentPath) -> Option<Document> {
        self.documents
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone()))
    }
}

#[async_trait]
impl DocumentResolver for StoreSnapshot {
    async fn resolve(&self, path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
        Ok(self.get(path))
    }
}
