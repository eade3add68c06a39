//! In-memory registry of processed documents.
//!
//! Documents are published as fully built, immutable snapshots. The write lock is held only
//! for the swap itself, and readers clone an `Arc` before releasing the read lock, so a query
//! keeps the version that was current when it arrived even if a newer upload lands meanwhile.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::extract::Section;
use crate::index::VectorIndex;
use crate::processing::chunking::Chunk;
use crate::processing::types::{DocumentSummary, SectionSummary};

/// Opaque identifier assigned to each processed document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Fully processed document: extraction, chunks, index, and summaries.
#[derive(Debug)]
pub struct ProcessedDocument {
    /// Identifier assigned at upload time.
    pub id: DocumentId,
    /// Filename supplied with the upload.
    pub filename: String,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub content_hash: String,
    /// RFC 3339 processing timestamp.
    pub processed_at: String,
    /// Pages (or text files) read from the upload.
    pub page_count: usize,
    /// Pages dropped because they held no text.
    pub skipped_pages: usize,
    /// Character count of the extracted text.
    pub total_characters: usize,
    /// Word count of the extracted text.
    pub total_words: usize,
    /// Ordered sections.
    pub sections: Vec<Section>,
    /// Chunks in id order.
    pub chunks: Vec<Chunk>,
    /// Similarity index over every chunk.
    pub index: VectorIndex,
    /// One summary per section, aligned with `sections`.
    pub section_summaries: Vec<SectionSummary>,
    /// Document-level overview.
    pub document_summary: DocumentSummary,
}

impl ProcessedDocument {
    /// Look up a chunk by id.
    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }
}

/// Errors raised while resolving a document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Nothing has been published yet.
    #[error("No document has been processed yet")]
    NoDocumentProcessed,
    /// The identifier was never issued by this process.
    #[error("Document {0} not found")]
    NotFound(DocumentId),
    /// The document existed but has been evicted.
    #[error("Document {0} is no longer available; process it again")]
    Stale(DocumentId),
}

/// Evicted ids remembered for stale detection; older ones resolve as not found.
const RETIRED_ID_CAPACITY: usize = 256;

#[derive(Default)]
struct StoreState {
    documents: VecDeque<Arc<ProcessedDocument>>,
    active: Option<DocumentId>,
    retired: VecDeque<DocumentId>,
}

impl StoreState {
    fn retire(&mut self, id: DocumentId) {
        if self.retired.len() == RETIRED_ID_CAPACITY {
            self.retired.pop_front();
        }
        self.retired.push_back(id);
    }
}

/// Registry of recently processed documents with a bounded retention window.
pub struct DocumentStore {
    retention: usize,
    state: RwLock<StoreState>,
}

impl DocumentStore {
    /// Create a store keeping at most `retention` documents (at least one).
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Make `document` the active document, evicting the oldest beyond the retention window.
    pub async fn publish(&self, document: ProcessedDocument) -> Arc<ProcessedDocument> {
        let document = Arc::new(document);
        let mut state = self.state.write().await;
        state.active = Some(document.id);
        state.documents.push_back(document.clone());
        while state.documents.len() > self.retention {
            if let Some(evicted) = state.documents.pop_front() {
                tracing::debug!(document_id = %evicted.id, "Evicted document from store");
                state.retire(evicted.id);
            }
        }
        document
    }

    /// Resolve a document snapshot; `None` selects the active document.
    pub async fn resolve(
        &self,
        id: Option<DocumentId>,
    ) -> Result<Arc<ProcessedDocument>, StoreError> {
        let state = self.state.read().await;
        let target = match id {
            Some(id) => id,
            None => state.active.ok_or(StoreError::NoDocumentProcessed)?,
        };
        if let Some(document) = state.documents.iter().find(|doc| doc.id == target) {
            return Ok(document.clone());
        }
        if state.retired.contains(&target) {
            Err(StoreError::Stale(target))
        } else {
            Err(StoreError::NotFound(target))
        }
    }

    /// Identifier of the active document, if any.
    pub async fn active_id(&self) -> Option<DocumentId> {
        self.state.read().await.active
    }

    /// Number of documents currently retained.
    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// Whether no document is retained.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
