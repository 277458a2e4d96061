//! Stave Render Library
//!
//! Decode-library seam, open-document registry and the off-thread render
//! pipeline that turns a page request into RGBA pixels.

pub mod decoder;
pub mod error;
pub mod lopdf_decoder;
#[cfg(feature = "pdfium")]
pub mod pdf;
pub mod pipeline;
pub mod store;

pub use decoder::{DecodeError, PageDecoder, PageSize, RawPixelBuffer};
pub use error::{RenderError, RenderResult};
pub use lopdf_decoder::LopdfDecoder;
#[cfg(feature = "pdfium")]
pub use pdf::PdfiumDecoder;
pub use pipeline::{validate_scale, RenderPipeline};
pub use store::{DocumentHandle, DocumentStore};
