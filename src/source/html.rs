//! HTML publication table: one `<tr class="publication">` row per paper.
//!
//! The title is the first `<b>` element of the row, every `<a href>` becomes
//! a link classified with [`LinkKind::from_href`], and an existing
//! `<img src>` names the file the figure is written to. The page itself is
//! never rewritten.

use super::{read_source, RecordStore};
use crate::error::PubFigError;
use crate::record::{Link, LinkKind, PublicationRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static RE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<tr\b[^>]*\bclass\s*=\s*["'][^"']*\bpublication\b[^"']*["'][^>]*>(.*?)</tr>"#)
        .unwrap()
});
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<b\b[^>]*>(.*?)</b>").unwrap());
static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).unwrap());
static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone)]
pub struct HtmlStore {
    path: PathBuf,
}

impl HtmlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(&self, html: &str) -> Vec<PublicationRecord> {
        RE_ROW
            .captures_iter(html)
            .enumerate()
            .map(|(i, caps)| record_from_row(i + 1, &caps[1]))
            .collect()
    }
}

impl RecordStore for HtmlStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<PublicationRecord>, PubFigError> {
        let html = read_source(&self.path)?;
        Ok(self.parse(&html))
    }

    fn save(&self, _records: &[PublicationRecord]) -> Result<(), PubFigError> {
        Err(PubFigError::ReadOnlySource {
            path: self.path.clone(),
        })
    }

    fn writable(&self) -> bool {
        false
    }
}

fn record_from_row(n: usize, row: &str) -> PublicationRecord {
    let title = RE_BOLD
        .captures(row)
        .map(|c| inner_text(&c[1]))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("pub-{n}"));

    let links = RE_HREF
        .captures_iter(row)
        .map(|c| {
            let href = decode_entities(c[1].trim());
            Link::new(LinkKind::from_href(&href), href)
        })
        .collect();

    let declared_image = RE_IMG_SRC
        .captures(row)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|s| !s.is_empty());

    PublicationRecord {
        title,
        year: None,
        links,
        picture: None,
        declared_image,
        fields: None,
    }
}

fn inner_text(fragment: &str) -> String {
    let stripped = RE_TAG.replace_all(fragment, "");
    let decoded = decode_entities(&stripped);
    RE_SPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
