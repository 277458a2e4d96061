//! Cache keys and rendered page data
//!
//! A rendered page is identified by the document it came from, its 1-based
//! page number and the scale it was rendered at. Pages rendered at different
//! zoom levels are distinct artifacts, so the scale is part of the key.

use std::fmt;

/// Unique identifier for an open document
pub type DocumentId = u64;

/// Bytes per pixel of every rendered page (RGBA8)
pub const BYTES_PER_PIXEL: usize = 4;

/// Key of one cacheable rendered artifact
///
/// The scale is stored as millionths so the key can be hashed and compared
/// exactly. Scales closer together than 1e-6 map to the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    /// Document the page belongs to
    pub document: DocumentId,

    /// 1-based page number
    pub page: u32,

    /// Render scale in millionths
    scale_millionths: u64,
}

impl PageKey {
    /// Create a key for `page` of `document` rendered at `scale`
    pub fn new(document: DocumentId, page: u32, scale: f32) -> Self {
        Self {
            document,
            page,
            scale_millionths: Self::quantize(scale),
        }
    }

    /// The render scale this key stands for
    pub fn scale(&self) -> f32 {
        (self.scale_millionths as f64 / 1_000_000.0) as f32
    }

    /// Quantized scale, as stored in the key
    pub fn scale_millionths(&self) -> u64 {
        self.scale_millionths
    }

    /// Whether the key holds `scale` without clamping it
    ///
    /// Zero, negative and non-finite scales quantize to 0. Scales too large
    /// for the millionths counter saturate at `u64::MAX`.
    pub fn is_exact_scale(&self) -> bool {
        self.scale_millionths > 0 && self.scale_millionths < u64::MAX
    }

    fn quantize(scale: f32) -> u64 {
        if !scale.is_finite() || scale <= 0.0 {
            return 0;
        }
        // `as` saturates at u64::MAX
        (f64::from(scale) * 1_000_000.0).round() as u64
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "doc {} page {} @ {:.3}x",
            self.document,
            self.page,
            self.scale()
        )
    }
}

/// Decoded pixels of one page at one scale
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Key the page was rendered for
    pub key: PageKey,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Raw pixel data (RGBA format, row-major)
    pub pixels: Vec<u8>,
}

impl RenderedPage {
    /// Create a new rendered page
    pub fn new(key: PageKey, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            key,
            width,
            height,
            pixels,
        }
    }

    /// Memory accounted to this page in bytes
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedPage")
            .field("key", &self.key)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
