use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::document::Document;
use crate::path::DocumentPath;

/// Infrastructure fault reported by a resolver. Absence of a document is not
/// a fault and is expressed as `Ok(None)`.
#[derive(Debug, Clone, Error)]
#[error("failed to fetch {path}: {message}")]
pub struct ResolverError {
    pub path: String,
    pub message: String,
}

impl ResolverError {
    pub fn new(path: &DocumentPath, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Capability supplied by the host storage layer for fetching documents
/// referenced by relationship checks.
#[async_trait]
pub trait DocumentResolver: Send + Sync {
    async fn resolve(&self, path: &DocumentPath) -> Result<Option<Document>, ResolverError>;
}

#[async_trait]
impl<T> DocumentResolver for Arc<T>
where
    T: DocumentResolver + ?Sized,
{
    async fn resolve(&self, path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
        (**self).resolve(path).await
    }
}

/// Resolver for hosts without related documents: every lookup is a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResolver;

#[async_trait]
impl DocumentResolver for EmptyResolver {
    async fn resolve(&self, _path: &DocumentPath) -> Result<Option<Document>, ResolverError> {
        Ok(None)
    }
}
