//! Image encoding: raw PDF image samples and rendered pages → PNG bytes.
//!
//! JPEG and JPEG 2000 streams are written verbatim by the extractor and never
//! pass through here. Only images stored as plain samples (optionally
//! Flate-compressed, already decompressed by the caller) need transcoding
//! before they can be opened by a browser.

use image::{DynamicImage, GrayImage, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Colour layout of a decoded 8-bit sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    Gray,
    Rgb,
    Cmyk,
}

impl SampleLayout {
    pub fn components(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    /// Layout for an ICC profile's `/N`.
    pub fn from_components(n: i64) -> Option<Self> {
        match n {
            1 => Some(Self::Gray),
            3 => Some(Self::Rgb),
            4 => Some(Self::Cmyk),
            _ => None,
        }
    }

    /// Infer the layout from the buffer size, assuming 8 bits per component.
    /// Only used for images that omit `/ColorSpace`.
    pub fn infer(width: u32, height: u32, len: usize) -> Option<Self> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        if pixels == 0 || len % pixels != 0 {
            return None;
        }
        Self::from_components((len / pixels) as i64)
    }
}

/// How an image's samples map to colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModel {
    /// Samples are colour components in `SampleLayout` order.
    Direct(SampleLayout),
    /// One palette index per pixel; `lookup` holds `hival + 1` colours in
    /// the `base` layout.
    Indexed {
        base: SampleLayout,
        hival: u8,
        lookup: Vec<u8>,
    },
}

/// Build an image from decoded samples.
///
/// Direct colour must be 8 bits per component; palette indices may be 1, 2,
/// 4 or 8 bits wide. Returns `None` when the buffer is shorter than the
/// dimensions require or the palette is truncated.
pub fn samples_to_image(
    width: u32,
    height: u32,
    bits_per_component: u8,
    model: &ColorModel,
    samples: &[u8],
) -> Option<DynamicImage> {
    let pixels = (width as usize).checked_mul(height as usize)?;
    if pixels == 0 {
        return None;
    }
    match model {
        ColorModel::Direct(layout) => {
            if bits_per_component != 8 {
                return None;
            }
            let samples = samples.get(..pixels.checked_mul(layout.components())?)?;
            layout_image(width, height, *layout, samples.to_vec())
        }
        ColorModel::Indexed {
            base,
            hival,
            lookup,
        } => {
            let indices = unpack_indices(width, height, bits_per_component, samples)?;
            let n = base.components();
            let palette = lookup.get(..(usize::from(*hival) + 1) * n)?;
            let mut expanded = Vec::with_capacity(pixels * n);
            for &index in &indices {
                let i = usize::from(index.min(*hival));
                expanded.extend_from_slice(&palette[i * n..(i + 1) * n]);
            }
            layout_image(width, height, *base, expanded)
        }
    }
}

fn layout_image(
    width: u32,
    height: u32,
    layout: SampleLayout,
    samples: Vec<u8>,
) -> Option<DynamicImage> {
    let img = match layout {
        SampleLayout::Gray => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, samples)?)
        }
        SampleLayout::Rgb => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, samples)?),
        SampleLayout::Cmyk => {
            let rgb = samples.chunks_exact(4).flat_map(cmyk_to_rgb).collect();
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, rgb)?)
        }
    };
    Some(img)
}

/// One palette index per pixel. Rows of sub-byte indices are padded to a
/// whole byte.
fn unpack_indices(width: u32, height: u32, bits: u8, samples: &[u8]) -> Option<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    match bits {
        8 => samples.get(..w.checked_mul(h)?).map(<[u8]>::to_vec),
        1 | 2 | 4 => {
            let bits = usize::from(bits);
            let per_byte = 8 / bits;
            let row_bytes = (w * bits).div_ceil(8);
            let mask = (1u8 << bits) - 1;
            let data = samples.get(..row_bytes.checked_mul(h)?)?;
            let indices = data
                .chunks_exact(row_bytes)
                .flat_map(|row| {
                    (0..w).map(move |x| {
                        let shift = 8 - bits * (x % per_byte + 1);
                        (row[x / per_byte] >> shift) & mask
                    })
                })
                .collect();
            Some(indices)
        }
        _ => None,
    }
}

fn cmyk_to_rgb(px: &[u8]) -> [u8; 3] {
    let k = 255 - u16::from(px[3]);
    let ch = |c: u8| ((255 - u16::from(c)) * k / 255) as u8;
    [ch(px[0]), ch(px[1]), ch(px[2])]
}

/// PNG-encode an image.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
