//! Pure-Rust decoder backed by `lopdf`
//!
//! Reads page geometry from each page's `MediaBox` and rasterizes a blank
//! sheet (white page, light grey border) at the requested scale. It needs no
//! native library, which makes it the default backend for diagnostics and
//! for hosts where PDFium is unavailable.

use crate::decoder::{DecodeError, PageDecoder, PageSize, RawPixelBuffer};
use image::{Rgba, RgbaImage};
use lopdf::Document;
use stave_cache::DocumentId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Default)]
pub struct LopdfDecoder {
    documents: Mutex<HashMap<DocumentId, Vec<PageSize>>>,
}

impl LopdfDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<DocumentId, Vec<PageSize>>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, DecodeError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(DecodeError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize {
                        width_pt: (x1 - x0).abs(),
                        height_pt: (y1 - y0).abs(),
                    })
                })
                .unwrap_or(PageSize::LETTER);

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(sizes)
    }
}

impl PageDecoder for LopdfDecoder {
    fn open_document(
        &self,
        document: DocumentId,
        bytes: Vec<u8>,
    ) -> Result<Vec<PageSize>, DecodeError> {
        let sizes = Self::parse_sizes(&bytes)?;
        self.documents().insert(document, sizes.clone());
        Ok(sizes)
    }

    fn decode_page(
        &self,
        document: DocumentId,
        page: u32,
        scale: f32,
    ) -> Result<RawPixelBuffer, DecodeError> {
        let size = {
            let documents = self.documents();
            let sizes = documents
                .get(&document)
                .ok_or(DecodeError::UnknownDocument(document))?;
            let index = page.checked_sub(1).map(|index| index as usize);
            match index.and_then(|index| sizes.get(index)) {
                Some(size) => *size,
                None => {
                    return Err(DecodeError::PageOutOfRange {
                        page,
                        page_count: sizes.len() as u32,
                    })
                }
            }
        };

        let (width, height) = size.pixel_size(scale);
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(RawPixelBuffer {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    fn close_document(&self, document: DocumentId) {
        self.documents().remove(&document);
    }
}
