//! Decoded page store
//!
//! Tracks the documents currently open in the decode library along with the
//! page geometry read at open time, so page counts and sizes never require a
//! round trip into the decoder.

use crate::decoder::{DecodeError, PageDecoder, PageSize};
use crate::error::{RenderError, RenderResult};
use stave_cache::DocumentId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
struct DocumentInner {
    id: DocumentId,
    page_sizes: Vec<PageSize>,
}

/// Reference to an open document
///
/// Cheap to clone. A handle outliving `close` still answers geometry queries,
/// but renders against it fail with `UnknownDocument`.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    inner: Arc<DocumentInner>,
}

impl DocumentHandle {
    /// The document ID
    pub fn id(&self) -> DocumentId {
        self.inner.id
    }

    /// Number of pages in the document
    pub fn page_count(&self) -> u32 {
        self.inner.page_sizes.len() as u32
    }

    /// Native size of a 1-based page
    pub fn page_size(&self, page: u32) -> RenderResult<PageSize> {
        page.checked_sub(1)
            .and_then(|index| self.inner.page_sizes.get(index as usize))
            .copied()
            .ok_or(RenderError::OutOfRange {
                page,
                page_count: self.page_count(),
            })
    }

    /// Whether `page` lies in `[1, page_count]`
    pub fn contains_page(&self, page: u32) -> bool {
        page >= 1 && page <= self.page_count()
    }
}

/// Registry of open documents
pub struct DocumentStore {
    decoder: Arc<dyn PageDecoder>,
    next_id: AtomicU64,
    documents: RwLock<HashMap<DocumentId, DocumentHandle>>,
}

impl DocumentStore {
    pub fn new(decoder: Arc<dyn PageDecoder>) -> Self {
        Self {
            decoder,
            next_id: AtomicU64::new(1),
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// The decoder documents are opened with
    pub fn decoder(&self) -> Arc<dyn PageDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Open a document from its bytes
    ///
    /// Parsing happens on the calling thread.
    pub fn open(&self, bytes: Vec<u8>) -> Result<DocumentHandle, DecodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let page_sizes = self.decoder.open_document(id, bytes)?;

        let handle = DocumentHandle {
            inner: Arc::new(DocumentInner { id, page_sizes }),
        };
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle.clone());

        log::info!("opened document {id} ({} pages)", handle.page_count());
        Ok(handle)
    }

    /// Look up an open document
    pub fn get(&self, id: DocumentId) -> RenderResult<DocumentHandle> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RenderError::UnknownDocument(id))
    }

    /// Page count of an open document
    pub fn page_count(&self, id: DocumentId) -> RenderResult<u32> {
        self.get(id).map(|handle| handle.page_count())
    }

    pub fn is_open(&self, id: DocumentId) -> bool {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Close a document and release its decoder resources
    ///
    /// Returns `false` if the document was not open.
    pub fn close(&self, id: DocumentId) -> bool {
        let removed = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();

        if removed {
            self.decoder.close_document(id);
            log::info!("closed document {id}");
        }
        removed
    }

    /// IDs of all open documents
    pub fn open_documents(&self) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lopdf_decoder::tests::pdf_with_pages;
    use crate::lopdf_decoder::LopdfDecoder;

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(LopdfDecoder::new()))
    }

    #[test]
    fn test_open_assigns_distinct_ids() {
        let store = store();
        let a = store.open(pdf_with_pages(&[(612, 792)])).expect("open");
        let b = store.open(pdf_with_pages(&[(612, 792)])).expect("open");

        assert_ne!(a.id(), b.id());
        assert_eq!(store.open_documents(), vec![a.id(), b.id()]);
    }

    #[test]
    fn test_handle_geometry() {
        let store = store();
        let handle = store
            .open(pdf_with_pages(&[(612, 792), (300, 200), (100, 100)]))
            .expect("open");

        assert_eq!(handle.page_count(), 3);
        assert_eq!(store.page_count(handle.id()), Ok(3));
        assert_eq!(
            handle.page_size(2),
            Ok(PageSize { width_pt: 300.0, height_pt: 200.0 })
        );
        assert_eq!(
            handle.page_size(0),
            Err(RenderError::OutOfRange { page: 0, page_count: 3 })
        );
        assert!(handle.contains_page(3));
        assert!(!handle.contains_page(4));
    }

    #[test]
    fn test_close_forgets_document() {
        let store = store();
        let handle = store.open(pdf_with_pages(&[(612, 792)])).expect("open");

        assert!(store.is_open(handle.id()));
        assert!(store.close(handle.id()));
        assert!(!store.close(handle.id()));
        assert!(!store.is_open(handle.id()));
        assert_eq!(
            store.get(handle.id()).map(|h| h.id()),
            Err(RenderError::UnknownDocument(handle.id()))
        );
    }

    #[test]
    fn test_failed_open_registers_nothing() {
        let store = store();
        assert!(store.open(b"%PDF-garbage".to_vec()).is_err());
        assert!(store.open_documents().is_empty());
    }
}
