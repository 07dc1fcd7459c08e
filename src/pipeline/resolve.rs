//! Link resolution: pick the one URL per record that should be a full-text PDF.
//!
//! Resolution is an ordered list of [`LinkRule`]s. Rules are tried in
//! [`LinkRule::ORDER`]; the first rule that accepts any of the record's links
//! (scanned in list order) wins. A record with both an explicit PDF link and
//! an arXiv link therefore always resolves to the explicit PDF, regardless of
//! which appears first in the data file.

use crate::record::{Link, LinkKind, PublicationRecord};
use reqwest::Url;
use std::collections::BTreeMap;
use tracing::debug;

/// One resolution rule over a typed link kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRule {
    /// `pdf` links, used verbatim.
    DirectPdf,
    /// `arxiv` links; `/abs/` pages are rewritten to `/pdf/….pdf`.
    ArxivAbstract,
    /// `openreview` links; `/forum?id=` is rewritten to `/pdf?id=`.
    OpenReviewForum,
}

impl LinkRule {
    /// Priority order.
    pub const ORDER: [LinkRule; 3] = [
        LinkRule::DirectPdf,
        LinkRule::ArxivAbstract,
        LinkRule::OpenReviewForum,
    ];

    /// Apply this rule to a single link. `url` is the parsed form of `text`,
    /// which is the link as written when absolute, or joined onto the site
    /// base when relative.
    fn apply(self, kind: &LinkKind, url: &Url, text: &str) -> Option<String> {
        match (self, kind) {
            (LinkRule::DirectPdf, LinkKind::Pdf) => Some(text.to_string()),
            (LinkRule::ArxivAbstract, LinkKind::Arxiv) => {
                if !url.host_str().is_some_and(is_arxiv_host) {
                    return None;
                }
                Some(arxiv_pdf_url(text))
            }
            (LinkRule::OpenReviewForum, LinkKind::OpenReview) => {
                Some(text.replacen("/forum?id=", "/pdf?id=", 1))
            }
            _ => None,
        }
    }
}

fn is_arxiv_host(host: &str) -> bool {
    host == "arxiv.org" || host.ends_with(".arxiv.org")
}

/// `…/abs/2401.00001v2` → `…/pdf/2401.00001v2.pdf`. Non-abstract URLs are
/// returned as given.
pub fn arxiv_pdf_url(url: &str) -> String {
    if !url.contains("/abs/") {
        return url.to_string();
    }
    let rewritten = url.replacen("/abs/", "/pdf/", 1);
    if rewritten.ends_with(".pdf") {
        rewritten
    } else {
        format!("{rewritten}.pdf")
    }
}

/// Absolutise `href` against `site_base`.
///
/// Absolute `http(s)` URLs are kept; anything else (site-relative paths,
/// bare file names) is joined onto the base. Returns `None` when the result
/// is not a valid http(s) URL.
pub fn normalize_url(href: &str, site_base: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let url = match Url::parse(href) {
        Ok(u) => u,
        Err(_) => Url::parse(site_base).ok()?.join(href).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// The link exactly as written when it was already absolute, otherwise the
/// joined URL.
fn verbatim_or_joined(href: &str, url: &Url) -> String {
    let href = href.trim();
    if Url::parse(href).is_ok() {
        href.to_string()
    } else {
        url.to_string()
    }
}

/// Resolve a record's PDF URL from its links.
pub fn resolve_links(links: &[Link], site_base: &str) -> Option<String> {
    for rule in LinkRule::ORDER {
        for link in links {
            let Some(url) = normalize_url(&link.url, site_base) else {
                continue;
            };
            let text = verbatim_or_joined(&link.url, &url);
            if let Some(pdf) = rule.apply(&link.kind, &url, &text) {
                debug!("{rule:?} matched {} -> {pdf}", link.url);
                return Some(pdf);
            }
        }
    }
    None
}

/// Resolve a record's PDF URL, consulting the title override table first.
pub fn resolve_pdf_url(
    record: &PublicationRecord,
    overrides: &BTreeMap<String, String>,
    site_base: &str,
) -> Option<String> {
    if let Some(url) = overrides.get(&record.title) {
        debug!("Using override URL for '{}'", record.title);
        return normalize_url(url, site_base).map(|u| verbatim_or_joined(url, &u));
    }
    resolve_links(&record.links, site_base)
}
