#![allow(dead_code)]

use lopdf::{dictionary, Document, Object};
use stave_core::{DecodeError, DocumentId, PageDecoder, PageSize, RawPixelBuffer};
use std::sync::{Condvar, Mutex};

pub const MB: usize = 1024 * 1024;

/// 1024x512 points: exactly 2 MiB of RGBA at scale 1.0
pub const TWO_MB_PAGE: PageSize = PageSize {
    width_pt: 1024.0,
    height_pt: 512.0,
};

/// Decoder with a controllable gate and a log of decoded pages
///
/// Every document has `page_count` pages of `page_size`. While the gate is
/// closed, decodes block on the blocking pool until the test releases them.
pub struct FakeDecoder {
    page_count: usize,
    page_size: PageSize,
    open: Mutex<bool>,
    opened: Condvar,
    calls: Mutex<Vec<u32>>,
}

impl FakeDecoder {
    pub fn new(page_count: usize, page_size: PageSize) -> Self {
        Self {
            page_count,
            page_size,
            open: Mutex::new(true),
            opened: Condvar::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same decoder with its gate closed
    pub fn gated(page_count: usize, page_size: PageSize) -> Self {
        let decoder = Self::new(page_count, page_size);
        *decoder.open.lock().unwrap() = false;
        decoder
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    /// Pages decoded so far, in the order decoding started
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageDecoder for FakeDecoder {
    fn open_document(
        &self,
        _document: DocumentId,
        _bytes: Vec<u8>,
    ) -> Result<Vec<PageSize>, DecodeError> {
        Ok(vec![self.page_size; self.page_count])
    }

    fn decode_page(
        &self,
        _document: DocumentId,
        page: u32,
        scale: f32,
    ) -> Result<RawPixelBuffer, DecodeError> {
        self.calls.lock().unwrap().push(page);

        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);

        let (width, height) = self.page_size.pixel_size(scale);
        Ok(RawPixelBuffer {
            width,
            height,
            pixels: vec![page as u8; width as usize * height as usize * 4],
        })
    }

    fn close_document(&self, _document: DocumentId) {}
}

/// Minimal PDF whose pages have the given MediaBox sizes in points
pub fn pdf_with_pages(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = sizes
        .iter()
        .map(|&(width, height)| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory save should succeed");
    bytes
}
