//! Publication list storage.
//!
//! A [`RecordStore`] loads the record list at the start of a run and, for
//! writable formats, persists it once at the end when at least one record
//! gained a picture.
//!
//! | Store | Format | Write-back |
//! |-------|--------|------------|
//! | [`YamlStore`] | list of mappings (`_data/publications.yml`) | yes, key order kept |
//! | [`HtmlStore`] | `<tr class="publication">` rows | no |

pub mod html;
pub mod yaml;

pub use html::HtmlStore;
pub use yaml::YamlStore;

use crate::error::PubFigError;
use crate::record::PublicationRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub trait RecordStore: Send + Sync {
    /// File this store reads from.
    fn path(&self) -> &Path;

    /// Read every record, in source order.
    ///
    /// # Errors
    /// [`PubFigError::SourceNotFound`] when the file is absent; this is the
    /// one condition that stops a run before any record is processed.
    fn load(&self) -> Result<Vec<PublicationRecord>, PubFigError>;

    /// Replace the stored list with `records`.
    fn save(&self, records: &[PublicationRecord]) -> Result<(), PubFigError>;

    /// Whether [`RecordStore::save`] is supported.
    fn writable(&self) -> bool {
        true
    }
}

/// Which publication list a run reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Yaml(PathBuf),
    Html(PathBuf),
}

impl SourceFormat {
    pub fn path(&self) -> &Path {
        match self {
            Self::Yaml(p) | Self::Html(p) => p,
        }
    }

    pub fn open(&self) -> Box<dyn RecordStore> {
        match self {
            Self::Yaml(p) => Box::new(YamlStore::new(p)),
            Self::Html(p) => Box::new(HtmlStore::new(p)),
        }
    }
}

/// Read a source file, mapping a missing file to `SourceNotFound`.
pub(crate) fn read_source(path: &Path) -> Result<String, PubFigError> {
    if !path.exists() {
        return Err(PubFigError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| PubFigError::SourceRead {
        path: path.to_path_buf(),
        source,
    })
}
