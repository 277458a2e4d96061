//! PDFium-backed decoder
//!
//! Renders real page content through the PDFium dynamic library. PDFium is
//! not re-entrant, so every call into it goes through one mutex; the
//! scheduler's concurrency bound keeps contention on it low.

use crate::decoder::{DecodeError, PageDecoder, PageSize, RawPixelBuffer};
use pdfium_render::prelude::*;
use stave_cache::DocumentId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Decoder that renders pages with PDFium
pub struct PdfiumDecoder {
    pdfium: &'static Pdfium,
    documents: Mutex<HashMap<DocumentId, PdfDocument<'static>>>,
}

impl PdfiumDecoder {
    /// Bind the PDFium library
    ///
    /// Search order:
    /// 1. Executable's directory (for app bundles: .app/Contents/MacOS/)
    /// 2. Current working directory
    /// 3. System library paths
    pub fn new() -> Result<Self, DecodeError> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        let bindings = exe_dir
            .and_then(|dir| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)).ok()
            })
            .map(Ok)
            .unwrap_or_else(|| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
            })
            .map_err(|e| DecodeError::Backend(format!("failed to bind pdfium: {e}")))?;

        // Documents borrow the library for their whole life; the binding is
        // process-wide anyway.
        let pdfium: &'static Pdfium = Box::leak(Box::new(Pdfium::new(bindings)));

        Ok(Self {
            pdfium,
            documents: Mutex::new(HashMap::new()),
        })
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<DocumentId, PdfDocument<'static>>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PageDecoder for PdfiumDecoder {
    fn open_document(
        &self,
        document: DocumentId,
        bytes: Vec<u8>,
    ) -> Result<Vec<PageSize>, DecodeError> {
        let pdf = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| DecodeError::Backend(e.to_string()))?;

        let sizes: Vec<PageSize> = pdf
            .pages()
            .iter()
            .map(|page| PageSize {
                width_pt: page.width().value,
                height_pt: page.height().value,
            })
            .collect();

        if sizes.is_empty() {
            return Err(DecodeError::Empty);
        }

        self.documents().insert(document, pdf);
        Ok(sizes)
    }

    fn decode_page(
        &self,
        document: DocumentId,
        page: u32,
        scale: f32,
    ) -> Result<RawPixelBuffer, DecodeError> {
        let documents = self.documents();
        let pdf = documents
            .get(&document)
            .ok_or(DecodeError::UnknownDocument(document))?;

        let page_count = u32::from(pdf.pages().len());
        if page == 0 || page > page_count {
            return Err(DecodeError::PageOutOfRange { page, page_count });
        }

        let pdf_page = pdf
            .pages()
            .get((page - 1) as u16)
            .map_err(|e| DecodeError::Backend(e.to_string()))?;

        let size = PageSize {
            width_pt: pdf_page.width().value,
            height_pt: pdf_page.height().value,
        };
        let (width, height) = size.pixel_size(scale);

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| DecodeError::Backend(e.to_string()))?;

        Ok(RawPixelBuffer {
            width,
            height,
            pixels: bitmap.as_rgba_bytes().to_vec(),
        })
    }

    fn close_document(&self, document: DocumentId) {
        self.documents().remove(&document);
    }
}
