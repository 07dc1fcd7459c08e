//! Publication records as read from a site's publication list.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// What a link points at, as far as PDF resolution cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Direct link to the full-text PDF.
    Pdf,
    /// arXiv page (abstract or PDF).
    Arxiv,
    /// OpenReview forum or PDF page.
    OpenReview,
    /// Code, slides, project pages and anything else.
    Other(String),
}

impl LinkKind {
    /// Parse a data-file `type:` tag. Case-insensitive.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "arxiv" => Self::Arxiv,
            "openreview" => Self::OpenReview,
            other => Self::Other(other.to_string()),
        }
    }

    /// Classify a bare `href` from HTML markup.
    ///
    /// Order matters: `arxiv.org/pdf/…` contains "pdf" and counts as a direct
    /// PDF link, only `arxiv.org/abs/…` is classified as arXiv.
    pub fn from_href(href: &str) -> Self {
        let lower = href.to_ascii_lowercase();
        if lower.ends_with(".pdf") || lower.contains("pdf") {
            Self::Pdf
        } else if lower.contains("arxiv.org/abs") {
            Self::Arxiv
        } else if lower.contains("openreview.net") {
            Self::OpenReview
        } else {
            Self::Other(String::new())
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => f.write_str("pdf"),
            Self::Arxiv => f.write_str("arxiv"),
            Self::OpenReview => f.write_str("openreview"),
            Self::Other(tag) => f.write_str(tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub url: String,
}

impl Link {
    pub fn new(kind: LinkKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// One publication entry.
///
/// Records are identified by their position in the source list. For data
/// files the complete original mapping is kept so that fields this crate
/// does not model survive the write-back in their original order.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationRecord {
    pub title: String,
    pub year: Option<i32>,
    pub links: Vec<Link>,
    /// Site-relative picture path, e.g. `/images/publications/foo.png`.
    pub picture: Option<String>,
    /// Image path the source already references (HTML `<img src>`), used to
    /// name the extracted figure.
    pub declared_image: Option<String>,
    pub(crate) fields: Option<serde_yaml::Mapping>,
}

impl PublicationRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year: None,
            links: Vec::new(),
            picture: None,
            declared_image: None,
            fields: None,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_link(mut self, kind: LinkKind, url: impl Into<String>) -> Self {
        self.links.push(Link::new(kind, url));
        self
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    pub fn with_declared_image(mut self, path: impl Into<String>) -> Self {
        self.declared_image = Some(path.into());
        self
    }

    /// An empty picture string counts as no picture.
    pub fn has_picture(&self) -> bool {
        self.picture.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// File stem for the extracted figure: the declared image's stem when
    /// there is one, the title slug otherwise. Titles without any ASCII
    /// letter or digit fall back to `paper-{position}`.
    pub fn figure_stem(&self, position: usize) -> String {
        let stem = self
            .declared_image
            .as_deref()
            .and_then(|p| {
                Path::new(p.trim_start_matches('/'))
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&self.title));
        if stem.is_empty() {
            format!("paper-{position}")
        } else {
            stem
        }
    }

    /// Site-relative directory of the declared image, e.g. `assets/thumbs`
    /// for `/assets/thumbs/guard.png`.
    ///
    /// `None` when there is no declared image, or it is a full URL or
    /// contains `..`.
    pub fn declared_dir(&self) -> Option<PathBuf> {
        let declared = self.declared_image.as_deref()?;
        if declared.contains("://") {
            return None;
        }
        let path = Path::new(declared.trim_start_matches('/'));
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        path.parent().map(Path::to_path_buf)
    }
}

static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// `"DataGen: Unified  Synthetic…"` → `"datagen-unified-synthetic"`.
pub fn slugify(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    RE_NON_SLUG
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}
