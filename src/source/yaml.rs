//! YAML publication list: a top-level sequence of mappings.
//!
//! ```yaml
//! - title: "PIGuard: Prompt Injection Guardrail"
//!   year: 2025
//!   links:
//!     - type: arxiv
//!       url: https://arxiv.org/abs/2410.22770
//!   picture: /images/publications/piguard.png
//! ```
//!
//! Only `title`, `year`, `links[].type`, `links[].url` and `picture` are
//! interpreted. The whole mapping is carried on the record, and saving
//! re-emits it with `picture` updated in place (or appended), so unrelated
//! fields and key order are untouched.

use super::{read_source, RecordStore};
use crate::error::PubFigError;
use crate::record::{Link, LinkKind, PublicationRecord};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct YamlStore {
    path: PathBuf,
}

impl YamlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse a YAML document into records.
    pub fn parse(&self, text: &str) -> Result<Vec<PublicationRecord>, PubFigError> {
        let doc: Value = serde_yaml::from_str(text).map_err(|e| PubFigError::SourceParse {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;

        let items = match doc {
            Value::Null => return Ok(Vec::new()),
            Value::Sequence(items) => items,
            other => {
                return Err(PubFigError::SourceParse {
                    path: self.path.clone(),
                    detail: format!("expected a list of publications, found {}", kind_of(&other)),
                })
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Mapping(m) => Ok(record_from_mapping(i, m)),
                other => Err(PubFigError::SourceParse {
                    path: self.path.clone(),
                    detail: format!("entry {} is a {}, expected a mapping", i + 1, kind_of(&other)),
                }),
            })
            .collect()
    }

    /// Render records back into a YAML document.
    pub fn render(&self, records: &[PublicationRecord]) -> Result<String, PubFigError> {
        let seq: Vec<Value> = records
            .iter()
            .map(|r| Value::Mapping(mapping_for(r)))
            .collect();
        serde_yaml::to_string(&seq).map_err(|e| PubFigError::Serialise {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }
}

impl RecordStore for YamlStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<PublicationRecord>, PubFigError> {
        let text = read_source(&self.path)?;
        self.parse(&text)
    }

    /// Atomic write: temp file next to the target, then rename.
    fn save(&self, records: &[PublicationRecord]) -> Result<(), PubFigError> {
        let text = self.render(records)?;
        let tmp = self.path.with_extension("yml.tmp");
        let write_err = |source| PubFigError::SourceWrite {
            path: self.path.clone(),
            source,
        };
        std::fs::write(&tmp, text.as_bytes()).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

fn record_from_mapping(index: usize, fields: Mapping) -> PublicationRecord {
    let title = fields
        .get("title")
        .and_then(scalar_string)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("paper-{index}"));

    let year = fields.get("year").and_then(|v| match v {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    let links = fields
        .get("links")
        .and_then(Value::as_sequence)
        .map(|seq| seq.iter().filter_map(link_from_value).collect())
        .unwrap_or_default();

    let picture = fields
        .get("picture")
        .and_then(scalar_string)
        .filter(|p| !p.trim().is_empty());

    PublicationRecord {
        title,
        year,
        links,
        picture,
        declared_image: None,
        fields: Some(fields),
    }
}

fn link_from_value(value: &Value) -> Option<Link> {
    let m = value.as_mapping()?;
    let url = m.get("url").and_then(scalar_string)?;
    let kind = m
        .get("type")
        .and_then(scalar_string)
        .map(|t| LinkKind::from_tag(&t))
        .unwrap_or_else(|| LinkKind::Other(String::new()));
    Some(Link { kind, url })
}

/// The mapping to emit for `record`: its original fields with `picture`
/// synchronised, or a fresh mapping for records built in code.
fn mapping_for(record: &PublicationRecord) -> Mapping {
    let mut m = match &record.fields {
        Some(fields) => fields.clone(),
        None => {
            let mut m = Mapping::new();
            m.insert("title".into(), record.title.clone().into());
            if let Some(year) = record.year {
                m.insert("year".into(), Value::Number(year.into()));
            }
            if !record.links.is_empty() {
                let links = record
                    .links
                    .iter()
                    .map(|l| {
                        let mut lm = Mapping::new();
                        lm.insert("type".into(), l.kind.to_string().into());
                        lm.insert("url".into(), l.url.clone().into());
                        Value::Mapping(lm)
                    })
                    .collect();
                m.insert("links".into(), Value::Sequence(links));
            }
            m
        }
    };
    if let Some(picture) = &record.picture {
        m.insert("picture".into(), picture.clone().into());
    }
    m
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- title: "MetaAgent: Automatically Building Multi-Agent System"
  authors: "A. Author, B. Autor"
  year: 2025
  venue: ICML
  links:
    - type: arxiv
      url: https://arxiv.org/abs/2507.22606
    - type: code
      url: https://github.com/x/metaagent
- title: Older Paper
  year: "2023"
  picture: /images/publications/older.png
- venue: NeurIPS
"#;

    fn store() -> YamlStore {
        YamlStore::new("publications.yml")
    }

    #[test]
    fn parses_records_in_order() {
        let recs = store().parse(SAMPLE).unwrap();
        assert_eq!(recs.len(), 3);

        assert_eq!(recs[0].year, Some(2025));
        assert_eq!(recs[0].links.len(), 2);
        assert_eq!(recs[0].links[0].kind, LinkKind::Arxiv);
        assert_eq!(recs[0].links[1].kind, LinkKind::Other("code".into()));
        assert!(recs[0].picture.is_none());

        assert_eq!(recs[1].year, Some(2023));
        assert!(recs[1].has_picture());

        assert_eq!(recs[2].title, "paper-2");
    }

    #[test]
    fn empty_document_is_empty_list() {
        assert!(store().parse("").unwrap().is_empty());
    }

    #[test]
    fn non_list_document_is_rejected() {
        let err = store().parse("title: lonely").unwrap_err();
        assert!(matches!(err, PubFigError::SourceParse { .. }));
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn render_keeps_field_order_and_appends_picture() {
        let mut recs = store().parse(SAMPLE).unwrap();
        recs[0].picture = Some("/images/publications/metaagent.png".into());

        let out = store().render(&recs).unwrap();
        let first = out.split("\n- ").next().unwrap();
        let title = first.find("title:").unwrap();
        let authors = first.find("authors:").unwrap();
        let venue = first.find("venue:").unwrap();
        let links = first.find("links:").unwrap();
        let picture = first.find("picture:").unwrap();
        assert!(title < authors && authors < venue && venue < links && links < picture);

        let reparsed = store().parse(&out).unwrap();
        assert_eq!(
            reparsed[0].picture.as_deref(),
            Some("/images/publications/metaagent.png")
        );
        assert_eq!(reparsed[1].picture, recs[1].picture);
    }

    #[test]
    fn render_keeps_non_ascii_text_readable() {
        let recs = store().parse("- title: \"Détection de 水印\"\n").unwrap();
        let out = store().render(&recs).unwrap();
        assert!(out.contains("Détection de 水印"), "got: {out}");
    }

    #[test]
    fn save_and_load_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publications.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let store = YamlStore::new(&path);
        let mut recs = store.load().unwrap();
        recs[0].picture = Some("/images/publications/x.png".into());
        store.save(&recs).unwrap();

        assert!(!path.with_extension("yml.tmp").exists());
        let again = store.load().unwrap();
        assert_eq!(again[0].picture.as_deref(), Some("/images/publications/x.png"));
        assert_eq!(again.len(), 3);
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let err = YamlStore::new("/definitely/not/here.yml").load().unwrap_err();
        assert!(matches!(err, PubFigError::SourceNotFound { .. }));
    }

    #[test]
    fn records_built_in_code_render_their_fields() {
        let rec = PublicationRecord::new("Fresh")
            .with_year(2025)
            .with_link(LinkKind::Pdf, "https://example.org/fresh.pdf")
            .with_picture("/images/publications/fresh.png");
        let out = store().render(&[rec]).unwrap();
        let back = store().parse(&out).unwrap();
        assert_eq!(back[0].title, "Fresh");
        assert_eq!(back[0].year, Some(2025));
        assert_eq!(back[0].links[0].kind, LinkKind::Pdf);
        assert!(back[0].has_picture());
    }
}
