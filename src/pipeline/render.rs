//! First-page rasterisation for PDFs with no usable embedded image.
//!
//! Rendering sits behind the [`PageRenderer`] trait so the harvest loop can be
//! driven without a native pdfium library (tests inject a fake). The default,
//! [`PdfiumRenderer`], binds pdfium once per process through `pdfium-cache`,
//! which downloads the shared library on first use.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would be over
//! 7,000 × 9,900 px. `max_pixels` caps the longest edge regardless of physical
//! size, keeping memory bounded for oversized pages.

use crate::error::RecordError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders a single page of a PDF on disk.
///
/// Called from a blocking thread; implementations may block.
pub trait PageRenderer: Send + Sync {
    /// Render the 0-based `page_index` of `pdf` at `dpi`, with neither edge
    /// exceeding `max_pixels`.
    fn render_page(
        &self,
        pdf: &Path,
        page_index: usize,
        dpi: u32,
        max_pixels: u32,
    ) -> Result<DynamicImage, RecordError>;
}

static PDFIUM: OnceLock<Result<Pdfium, String>> = OnceLock::new();

/// Bind once; a failed bind is remembered so every later record fails fast
/// with the same reason instead of retrying the download.
fn pdfium() -> Result<&'static Pdfium, RecordError> {
    PDFIUM
        .get_or_init(|| {
            info!("Binding pdfium");
            pdfium_cache::bind().map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|reason| RecordError::RenderFailed {
            page: 1,
            detail: format!("pdfium unavailable: {reason}"),
        })
}

/// The default renderer, backed by pdfium.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRenderer;

impl PageRenderer for PdfiumRenderer {
    fn render_page(
        &self,
        pdf: &Path,
        page_index: usize,
        dpi: u32,
        max_pixels: u32,
    ) -> Result<DynamicImage, RecordError> {
        let page_no = page_index + 1;
        let fail = |detail: String| RecordError::RenderFailed {
            page: page_no,
            detail,
        };

        let pdfium = pdfium()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| RecordError::CorruptPdf {
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        if page_index >= pages.len() as usize {
            return Err(fail(format!("page out of range, total={}", pages.len())));
        }
        let page = pages
            .get(page_index as u16)
            .map_err(|e| fail(format!("{e:?}")))?;

        let render_config = render_config(dpi, max_pixels);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| fail(format!("{e:?}")))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_no,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

fn render_config(dpi: u32, max_pixels: u32) -> PdfRenderConfig {
    PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32)
}
