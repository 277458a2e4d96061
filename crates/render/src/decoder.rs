//! PDF decode library abstraction
//!
//! The engine never parses PDF content itself. Everything it needs from a
//! decode library goes through [`PageDecoder`]: open a document from bytes,
//! rasterize one page at one scale, release the document.

use stave_cache::{DocumentId, BYTES_PER_PIXEL};

/// Page dimensions in points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter, used when a page carries no usable media box
    pub const LETTER: PageSize = PageSize {
        width_pt: 612.0,
        height_pt: 792.0,
    };

    /// Pixel dimensions of this page rendered at `scale`
    ///
    /// `ceil(width * scale) x ceil(height * scale)`, never smaller than 1x1.
    pub fn pixel_size(&self, scale: f32) -> (u32, u32) {
        let width = (f64::from(self.width_pt) * f64::from(scale)).ceil().max(1.0);
        let height = (f64::from(self.height_pt) * f64::from(scale)).ceil().max(1.0);
        (width as u32, height as u32)
    }
}

/// Pixels produced by a decoder for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixelBuffer {
    pub width: u32,
    pub height: u32,

    /// RGBA pixel data, row-major
    pub pixels: Vec<u8>,
}

impl RawPixelBuffer {
    /// Number of bytes a well-formed buffer of these dimensions holds
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// Errors reported by a decode library
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("document {0} is not open")]
    UnknownDocument(DocumentId),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document has no pages")]
    Empty,
    #[error("encrypted PDFs are not supported by this decoder")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

/// A PDF decode library
///
/// Implementations are shared between the caller and the blocking render
/// threads, so they must be `Send + Sync`. Page numbers are 1-based.
pub trait PageDecoder: Send + Sync {
    /// Parse `bytes` and keep the document under `document`
    ///
    /// Returns the native size of every page, in page order.
    fn open_document(&self, document: DocumentId, bytes: Vec<u8>)
        -> Result<Vec<PageSize>, DecodeError>;

    /// Rasterize one page at `scale`
    ///
    /// The returned buffer must be `PageSize::pixel_size(scale)` in size.
    fn decode_page(
        &self,
        document: DocumentId,
        page: u32,
        scale: f32,
    ) -> Result<RawPixelBuffer, DecodeError>;

    /// Release every resource held for `document`
    fn close_document(&self, document: DocumentId);
}
