//! Render pipeline
//!
//! Turns a (document, page, scale) request into decoded pixels. Decoding runs
//! on tokio's blocking pool so the awaiting task, and whatever thread drives
//! it, never stalls on decode work. The pipeline only produces pixels;
//! deciding what to do with them is the scheduler's job.

use crate::decoder::PageDecoder;
use crate::error::{RenderError, RenderResult};
use crate::store::DocumentHandle;
use stave_cache::{PageKey, RenderedPage};
use std::sync::Arc;

/// Check that `scale` is a finite number greater than zero that a
/// [`PageKey`] can hold exactly
pub fn validate_scale(scale: f32) -> RenderResult<()> {
    if scale.is_finite() && scale > 0.0 && PageKey::new(0, 0, scale).is_exact_scale() {
        Ok(())
    } else {
        Err(RenderError::InvalidScale(scale))
    }
}

/// Stateless page renderer over a decoder
#[derive(Clone)]
pub struct RenderPipeline {
    decoder: Arc<dyn PageDecoder>,
}

impl RenderPipeline {
    pub fn new(decoder: Arc<dyn PageDecoder>) -> Self {
        Self { decoder }
    }

    /// Render one page of `document` at `scale`
    ///
    /// The scale is quantized the same way as [`PageKey`], so the pixels
    /// always match the key they are cached under.
    pub async fn render(
        &self,
        document: &DocumentHandle,
        page: u32,
        scale: f32,
    ) -> RenderResult<RenderedPage> {
        validate_scale(scale)?;
        let key = PageKey::new(document.id(), page, scale);
        let scale = key.scale();

        let (width, height) = document.page_size(page)?.pixel_size(scale);

        let decoder = Arc::clone(&self.decoder);
        let id = document.id();
        let raw = tokio::task::spawn_blocking(move || decoder.decode_page(id, page, scale))
            .await
            .map_err(|e| RenderError::Worker(e.to_string()))??;

        if raw.width != width || raw.height != height {
            return Err(RenderError::Decode(format!(
                "decoder produced {}x{} for {key}, expected {width}x{height}",
                raw.width, raw.height
            )));
        }
        if raw.pixels.len() != raw.expected_len() {
            return Err(RenderError::Decode(format!(
                "decoder produced {} bytes for {key}, expected {}",
                raw.pixels.len(),
                raw.expected_len()
            )));
        }

        Ok(RenderedPage::new(key, raw.width, raw.height, raw.pixels))
    }
}
