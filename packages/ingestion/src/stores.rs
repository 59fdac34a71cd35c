//! In-memory document index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::IngestError;
use crate::traits::{DocumentIndex, IndexedDocument};

/// A document index keyed by (project, content hash).
///
/// Good enough for single-process deployments and tests; swap in a real
/// vector store behind [`DocumentIndex`] for anything else.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    documents: Arc<RwLock<HashMap<(Uuid, String), Uuid>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn find_by_hash(
        &self,
        project_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Uuid>, IngestError> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(project_id, content_hash.to_string()))
            .copied())
    }

    async fn store(&self, document: IndexedDocument) -> Result<Uuid, IngestError> {
        let id = Uuid::new_v4();
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((document.project_id, document.content_hash), id);
        Ok(id)
    }
}
