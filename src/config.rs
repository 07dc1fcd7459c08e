//! Configuration types for a harvest run.
//!
//! Every knob lives in [`HarvestConfig`], built via [`HarvestConfigBuilder`].
//! The two constants that encode the extraction policy,
//! [`DEFAULT_MIN_IMAGE_BYTES`] and [`DEFAULT_LOOKAHEAD_PAGES`], are exposed
//! so callers can reason about (or override) the defaults.

use crate::error::PubFigError;
use crate::pipeline::render::PageRenderer;
use crate::progress::ProgressCallback;
use crate::source::SourceFormat;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Embedded images whose encoded stream is smaller than this are treated as
/// logos or decorations and skipped.
pub const DEFAULT_MIN_IMAGE_BYTES: usize = 10_000;

/// Number of leading pages scanned for embedded images.
pub const DEFAULT_LOOKAHEAD_PAGES: usize = 3;

/// Resolution of the first-page fallback render.
pub const DEFAULT_RENDER_DPI: u32 = 150;

/// Site that relative links in the publication list are relative to.
pub const DEFAULT_SITE_BASE: &str = "https://xiaocw11.github.io";

/// Configuration for one harvest run.
///
/// # Example
/// ```rust
/// use pubfig::HarvestConfig;
///
/// let config = HarvestConfig::builder()
///     .site_root("site")
///     .year(2025)
///     .min_image_bytes(20_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.lookahead_pages, 3);
/// ```
#[derive(Clone)]
pub struct HarvestConfig {
    /// Root of the site checkout. Relative paths below resolve against it.
    pub site_root: PathBuf,

    /// Publication list to read (relative to `site_root` unless absolute).
    /// Default: `_data/publications.yml`.
    pub source: SourceFormat,

    /// Directory figures are written to. Default: `images/publications`.
    pub images_dir: PathBuf,

    /// Prefix of the `picture` value written back. Default: `/images/publications`.
    pub picture_prefix: String,

    /// Base URL used to absolutise relative links.
    pub site_base: String,

    /// Only process records from this year. Default: all years.
    pub year: Option<i32>,

    /// Title → PDF URL table consulted before the link rules.
    pub url_overrides: BTreeMap<String, String>,

    /// Minimum encoded size of an embedded image. Default: [`DEFAULT_MIN_IMAGE_BYTES`].
    pub min_image_bytes: usize,

    /// Pages scanned for embedded images. Default: [`DEFAULT_LOOKAHEAD_PAGES`].
    pub lookahead_pages: usize,

    /// Fallback render resolution. Range 72–400. Default: 150.
    pub render_dpi: u32,

    /// Longest edge of the fallback render in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Per-download timeout in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Renderer for the first-page fallback. `None` uses pdfium.
    pub renderer: Option<Arc<dyn PageRenderer>>,

    /// Receives per-record progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            site_root: PathBuf::from("."),
            source: SourceFormat::Yaml(PathBuf::from("_data/publications.yml")),
            images_dir: PathBuf::from("images/publications"),
            picture_prefix: "/images/publications".to_string(),
            site_base: DEFAULT_SITE_BASE.to_string(),
            year: None,
            url_overrides: BTreeMap::new(),
            min_image_bytes: DEFAULT_MIN_IMAGE_BYTES,
            lookahead_pages: DEFAULT_LOOKAHEAD_PAGES,
            render_dpi: DEFAULT_RENDER_DPI,
            max_rendered_pixels: 4000,
            download_timeout_secs: 30,
            renderer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("site_root", &self.site_root)
            .field("source", &self.source)
            .field("images_dir", &self.images_dir)
            .field("picture_prefix", &self.picture_prefix)
            .field("site_base", &self.site_base)
            .field("year", &self.year)
            .field("url_overrides", &self.url_overrides.len())
            .field("min_image_bytes", &self.min_image_bytes)
            .field("lookahead_pages", &self.lookahead_pages)
            .field("render_dpi", &self.render_dpi)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn PageRenderer>"))
            .finish()
    }
}

impl HarvestConfig {
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Absolute (root-joined) path of the publication list.
    pub fn source_path(&self) -> PathBuf {
        self.resolve(self.source.path())
    }

    /// Absolute (root-joined) images directory.
    pub fn images_path(&self) -> PathBuf {
        self.resolve(&self.images_dir)
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.site_root.join(p)
        }
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    pub fn site_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.site_root = root.into();
        self
    }

    pub fn yaml_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source = SourceFormat::Yaml(path.into());
        self
    }

    pub fn html_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source = SourceFormat::Html(path.into());
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    pub fn picture_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.picture_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn site_base(mut self, base: impl Into<String>) -> Self {
        self.config.site_base = base.into();
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.config.year = Some(year);
        self
    }

    pub fn url_override(mut self, title: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.url_overrides.insert(title.into(), url.into());
        self
    }

    pub fn url_overrides(mut self, table: BTreeMap<String, String>) -> Self {
        self.config.url_overrides.extend(table);
        self
    }

    pub fn min_image_bytes(mut self, bytes: usize) -> Self {
        self.config.min_image_bytes = bytes;
        self
    }

    pub fn lookahead_pages(mut self, pages: usize) -> Self {
        self.config.lookahead_pages = pages;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarvestConfig, PubFigError> {
        let c = &self.config;
        if c.lookahead_pages == 0 {
            return Err(PubFigError::InvalidConfig(
                "lookahead must cover at least one page".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(PubFigError::InvalidConfig(
                "download timeout must be at least 1s".into(),
            ));
        }
        if !(c.site_base.starts_with("http://") || c.site_base.starts_with("https://")) {
            return Err(PubFigError::InvalidConfig(format!(
                "site base must be an http(s) URL, got '{}'",
                c.site_base
            )));
        }
        Ok(self.config)
    }
}
