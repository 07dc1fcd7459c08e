//! Figure extraction: choose one representative image for a downloaded PDF.
//!
//! The policy has two tiers:
//!
//! 1. Scan pages `1..=lookahead` in page-tree order. On each page, walk the
//!    image XObjects of the page's (possibly inherited) `Resources` in
//!    dictionary order. The first image whose encoded stream is at least
//!    `min_image_bytes` long and that can be saved natively wins.
//! 2. Otherwise render page 1 through the [`PageRenderer`] and save it as PNG.
//!
//! Small images are almost always publisher logos, ORCID badges or icons,
//! which is what the size filter exists to skip.

use crate::config::HarvestConfig;
use crate::error::RecordError;
use crate::output::{ExtractedFigure, FigureOrigin};
use crate::pipeline::encode::{encode_png, samples_to_image, ColorModel, SampleLayout};
use crate::pipeline::render::PageRenderer;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stream encodings the extractor understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEncoding {
    /// `DCTDecode`: a complete JPEG file.
    Jpeg,
    /// `JPXDecode`: a complete JPEG 2000 codestream.
    Jpeg2000,
    /// `FlateDecode` over raw samples.
    Flate,
    /// Unfiltered raw samples.
    Raw,
    /// Anything else, with the filter chain for logging.
    Unsupported(String),
}

impl ImageEncoding {
    fn from_filters(filters: &[Vec<u8>]) -> Self {
        match filters {
            [] => Self::Raw,
            [f] if f == b"DCTDecode" => Self::Jpeg,
            [f] if f == b"JPXDecode" => Self::Jpeg2000,
            [f] if f == b"FlateDecode" => Self::Flate,
            other => Self::Unsupported(
                other
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect::<Vec<_>>()
                    .join("+"),
            ),
        }
    }

    /// Extension the image is saved with, if it can be saved at all.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Jpeg => Some("jpg"),
            Self::Jpeg2000 => Some("jpx"),
            Self::Flate | Self::Raw => Some("png"),
            Self::Unsupported(_) => None,
        }
    }
}

/// An image XObject found on a page.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// 1-based page number.
    pub page: usize,
    /// Resource name, e.g. `Im0`.
    pub name: String,
    pub object_id: ObjectId,
    pub encoding: ImageEncoding,
    /// Length of the stream as stored in the file.
    pub encoded_len: usize,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
}

/// The subset of [`HarvestConfig`] the extractor needs, owned so it can move
/// onto a blocking thread.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub images_dir: PathBuf,
    pub min_image_bytes: usize,
    pub lookahead_pages: usize,
    pub render_dpi: u32,
    pub max_rendered_pixels: u32,
}

impl From<&HarvestConfig> for ExtractOptions {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            images_dir: config.images_path(),
            min_image_bytes: config.min_image_bytes,
            lookahead_pages: config.lookahead_pages,
            render_dpi: config.render_dpi,
            max_rendered_pixels: config.max_rendered_pixels,
        }
    }
}

/// Open a PDF with lopdf.
pub fn load_document(pdf: &Path) -> Result<Document, RecordError> {
    Document::load(pdf).map_err(|e| RecordError::CorruptPdf {
        detail: e.to_string(),
    })
}

/// Follow a reference, or return the object itself.
fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// The page's `Resources` dictionary, walking up the `Parent` chain when the
/// page inherits it.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Page trees are shallow; the bound guards against reference cycles.
    for _ in 0..32 {
        if let Ok(res) = node.get(b"Resources") {
            return deref(doc, res)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_u32(doc: &Document, dict: &Dictionary, key: &[u8]) -> u32 {
    dict.get(key)
        .ok()
        .and_then(|o| deref(doc, o))
        .and_then(|o| o.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

fn device_layout(name: &[u8]) -> Option<SampleLayout> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" => Some(SampleLayout::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(SampleLayout::Rgb),
        b"DeviceCMYK" | b"CMYK" => Some(SampleLayout::Cmyk),
        _ => None,
    }
}

/// A colour space whose samples are plain components: device spaces, their
/// calibrated forms, and ICC profiles with 1, 3 or 4 components.
fn direct_layout(doc: &Document, obj: &Object) -> Option<SampleLayout> {
    match deref(doc, obj)? {
        Object::Name(name) => device_layout(name),
        Object::Array(items) => match items.first()?.as_name().ok()? {
            b"ICCBased" => {
                let profile = deref(doc, items.get(1)?)?.as_stream().ok()?;
                let n = deref(doc, profile.dict.get(b"N").ok()?)?.as_i64().ok()?;
                SampleLayout::from_components(n)
            }
            family => device_layout(family),
        },
        _ => None,
    }
}

/// Stream data with its filters undone.
fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

/// Parse an image's `/ColorSpace`. `None` for spaces that cannot be turned
/// into gray or RGB pixels (Separation, DeviceN, Lab, Pattern).
fn color_model(doc: &Document, obj: &Object) -> Option<ColorModel> {
    if let Some(layout) = direct_layout(doc, obj) {
        return Some(ColorModel::Direct(layout));
    }
    let items = deref(doc, obj)?.as_array().ok()?;
    if !matches!(items.first()?.as_name().ok()?, b"Indexed" | b"I") {
        return None;
    }
    let base = direct_layout(doc, items.get(1)?)?;
    let hival = u8::try_from(deref(doc, items.get(2)?)?.as_i64().ok()?).ok()?;
    let lookup = match deref(doc, items.get(3)?)? {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(table) => stream_bytes(table)?,
        _ => return None,
    };
    Some(ColorModel::Indexed {
        base,
        hival,
        lookup,
    })
}

/// List the image XObjects on one page, in resource order.
pub fn page_images(doc: &Document, page_no: usize, page_id: ObjectId) -> Vec<EmbeddedImage> {
    let Some(resources) = page_resources(doc, page_id) else {
        return Vec::new();
    };
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| deref(doc, o))
        .and_then(|o| o.as_dict().ok())
    else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (name, obj) in xobjects.iter() {
        let Ok(object_id) = obj.as_reference() else {
            continue;
        };
        let Ok(stream) = doc.get_object(object_id).and_then(Object::as_stream) else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|s| s == b"Image");
        if !is_image {
            continue;
        }
        if stream
            .dict
            .get(b"ImageMask")
            .and_then(Object::as_bool)
            .unwrap_or(false)
        {
            continue;
        }
        images.push(EmbeddedImage {
            page: page_no,
            name: String::from_utf8_lossy(name).into_owned(),
            object_id,
            encoding: ImageEncoding::from_filters(&filters(&stream.dict)),
            encoded_len: stream.content.len(),
            width: dict_u32(doc, &stream.dict, b"Width"),
            height: dict_u32(doc, &stream.dict, b"Height"),
            bits_per_component: dict_u32(doc, &stream.dict, b"BitsPerComponent") as u8,
        });
    }
    images
}

/// Bytes and extension ready to be written for one candidate, or `None` when
/// the candidate cannot be saved.
fn saveable_bytes(
    doc: &Document,
    stream: &Stream,
    image: &EmbeddedImage,
) -> Option<(Vec<u8>, &'static str)> {
    let ext = image.encoding.extension()?;
    let bytes = match image.encoding {
        ImageEncoding::Jpeg | ImageEncoding::Jpeg2000 => stream.content.clone(),
        ImageEncoding::Flate | ImageEncoding::Raw => {
            let samples = stream_bytes(stream)?;
            let model = match stream.dict.get(b"ColorSpace") {
                Ok(space) => color_model(doc, space)?,
                Err(_) => ColorModel::Direct(SampleLayout::infer(
                    image.width,
                    image.height,
                    samples.len(),
                )?),
            };
            let img = samples_to_image(
                image.width,
                image.height,
                image.bits_per_component,
                &model,
                &samples,
            )?;
            encode_png(&img).ok()?
        }
        ImageEncoding::Unsupported(_) => return None,
    };
    Some((bytes, ext))
}

/// Pick the first qualifying embedded image in the lookahead window.
///
/// Returns the candidate together with the bytes to write.
pub fn select_embedded(
    doc: &Document,
    min_image_bytes: usize,
    lookahead_pages: usize,
) -> Option<(EmbeddedImage, Vec<u8>, &'static str)> {
    for (page_no, page_id) in doc.get_pages().into_iter().take(lookahead_pages) {
        for image in page_images(doc, page_no as usize, page_id) {
            if image.encoded_len < min_image_bytes {
                debug!(
                    "Page {}: {} too small ({} bytes)",
                    image.page, image.name, image.encoded_len
                );
                continue;
            }
            let Ok(stream) = doc.get_object(image.object_id).and_then(Object::as_stream) else {
                continue;
            };
            match saveable_bytes(doc, stream, &image) {
                Some((bytes, ext)) => return Some((image, bytes, ext)),
                None => debug!(
                    "Page {}: {} cannot be saved ({:?}, {}x{}, {} bpc)",
                    image.page,
                    image.name,
                    image.encoding,
                    image.width,
                    image.height,
                    image.bits_per_component
                ),
            }
        }
    }
    None
}

fn write_figure(
    images_dir: &Path,
    stem: &str,
    ext: &str,
    bytes: &[u8],
) -> Result<PathBuf, RecordError> {
    let path = images_dir.join(format!("{stem}.{ext}"));
    let fail = |e: std::io::Error| RecordError::WriteFailed {
        path: path.clone(),
        detail: e.to_string(),
    };
    std::fs::create_dir_all(images_dir).map_err(fail)?;
    std::fs::write(&path, bytes).map_err(fail)?;
    Ok(path)
}

/// Extract one figure from `pdf` into `<images_dir>/<stem>.<ext>`.
///
/// Blocking. Nothing is written when the document has no pages.
pub fn extract_figure(
    pdf: &Path,
    stem: &str,
    options: &ExtractOptions,
    renderer: &dyn PageRenderer,
) -> Result<ExtractedFigure, RecordError> {
    let doc = load_document(pdf)?;
    let page_count = doc.get_pages().len();
    if page_count == 0 {
        return Err(RecordError::EmptyDocument);
    }
    debug!("PDF loaded: {} pages", page_count);

    if let Some((image, bytes, ext)) =
        select_embedded(&doc, options.min_image_bytes, options.lookahead_pages)
    {
        let path = write_figure(&options.images_dir, stem, ext, &bytes)?;
        info!(
            "Saved embedded image {} from page {} → {}",
            image.name,
            image.page,
            path.display()
        );
        return Ok(ExtractedFigure {
            path,
            extension: ext.to_string(),
            origin: FigureOrigin::Embedded {
                page: image.page,
                encoded_bytes: image.encoded_len,
            },
        });
    }

    info!("No embedded image qualified; rendering page 1");
    let image = renderer.render_page(pdf, 0, options.render_dpi, options.max_rendered_pixels)?;
    let png = encode_png(&image).map_err(|e| RecordError::RenderFailed {
        page: 1,
        detail: e.to_string(),
    })?;
    let path = write_figure(&options.images_dir, stem, "png", &png)?;
    Ok(ExtractedFigure {
        path,
        extension: "png".to_string(),
        origin: FigureOrigin::RenderedPage {
            dpi: options.render_dpi,
        },
    })
}
