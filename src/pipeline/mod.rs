//! Pipeline stages for turning one publication record into one figure.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the render backend can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! resolve ──▶ fetch ──▶ extract ──▶ (encode | render)
//! (links)     (HTTP)    (lopdf)      (PNG)    (pdfium)
//! ```
//!
//! 1. [`resolve`]: pick the record's PDF URL with ordered link rules
//! 2. [`fetch`]: stream the PDF into a scoped temporary directory; the only
//!    stage with network I/O
//! 3. [`extract`]: scan the first pages for a large embedded image, or fall
//!    back to rendering page 1; blocking, so it runs in `spawn_blocking`
//! 4. [`encode`]: transcode raw image samples and rendered pages to PNG
//! 5. [`render`]: rasterise a page through the [`render::PageRenderer`] seam

pub mod encode;
pub mod extract;
pub mod fetch;
pub mod render;
pub mod resolve;
