//! # pdfium-cache
//!
//! Find a usable PDFium shared library for `pdfium-render`, downloading a
//! prebuilt copy from [bblanchon/pdfium-binaries] into a per-user cache the
//! first time one is needed.
//!
//! Resolution order used by [`ensure_library`]:
//!
//! 1. `PDFIUM_LIB_PATH`, when it names an existing file.
//! 2. `{cache_dir}/{lib_name}` from a previous download.
//! 3. Download `{archive}` for the current platform and unpack the library
//!    into the cache directory.
//!
//! The cache directory is `~/.cache/pubfig/pdfium-{PDFIUM_RELEASE}` on Linux
//! (platform equivalent elsewhere) and can be moved with `PDFIUM_CACHE_DIR`.
//!
//! [bblanchon/pdfium-binaries]: https://github.com/bblanchon/pdfium-binaries

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

/// pdfium-binaries release tag (`chromium/{PDFIUM_RELEASE}`).
pub const PDFIUM_RELEASE: &str = "7690";

const RELEASES_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Explicit library path; skips the cache and the download.
pub const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Overrides the base directory of the download cache.
pub const CACHE_DIR_ENV: &str = "PDFIUM_CACHE_DIR";

#[derive(Error, Debug)]
pub enum PdfiumCacheError {
    #[error("no prebuilt PDFium for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("cannot prepare cache directory '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDFium download failed: {0}")]
    Download(String),

    #[error("PDFium archive extraction failed: {0}")]
    Extract(String),

    #[error("cannot load PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

/// Release asset for one OS/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub archive: &'static str,
    pub member: &'static str,
    pub lib_name: &'static str,
}

impl Platform {
    pub fn current() -> Result<Self, PdfiumCacheError> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn for_target(os: &str, arch: &str) -> Result<Self, PdfiumCacheError> {
        let (archive, member, lib_name) = match (os, arch) {
            ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
            (os, arch) => {
                return Err(PdfiumCacheError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(Self {
            archive,
            member,
            lib_name,
        })
    }

    fn download_url(&self) -> String {
        format!("{RELEASES_URL}/chromium%2F{PDFIUM_RELEASE}/{}", self.archive)
    }
}

/// Directory holding the downloaded library for [`PDFIUM_RELEASE`].
pub fn cache_dir() -> PathBuf {
    let base = match std::env::var_os(CACHE_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("pubfig"),
    };
    base.join(format!("pdfium-{PDFIUM_RELEASE}"))
}

/// Library path if one is available without touching the network.
pub fn locate() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(LIB_PATH_ENV).map(PathBuf::from) {
        if p.is_file() {
            return Some(p);
        }
    }
    let platform = Platform::current().ok()?;
    let cached = cache_dir().join(platform.lib_name);
    cached.is_file().then_some(cached)
}

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Returns a path to the PDFium library, downloading it on first use.
///
/// Blocking. The resolved path is memoised for the life of the process.
pub fn ensure_library() -> Result<PathBuf, PdfiumCacheError> {
    if let Some(path) = RESOLVED.get() {
        return Ok(path.clone());
    }

    let path = match locate() {
        Some(path) => path,
        None => download_to_cache(&Platform::current()?, &cache_dir())?,
    };
    let _ = RESOLVED.set(path.clone());
    Ok(path)
}

/// Bind `pdfium-render` to the library at `path`.
pub fn bind_from(path: &Path) -> Result<Pdfium, PdfiumCacheError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumCacheError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// [`ensure_library`] followed by [`bind_from`].
pub fn bind() -> Result<Pdfium, PdfiumCacheError> {
    let path = ensure_library()?;
    bind_from(&path)
}

fn download_to_cache(platform: &Platform, dir: &Path) -> Result<PathBuf, PdfiumCacheError> {
    std::fs::create_dir_all(dir).map_err(|source| PdfiumCacheError::CacheDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let url = platform.download_url();
    let archive = fetch(&url)?;
    let dest = dir.join(platform.lib_name);
    unpack_member(&archive, platform.member, &dest)?;
    Ok(dest)
}

fn fetch(url: &str) -> Result<Vec<u8>, PdfiumCacheError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-cache/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumCacheError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumCacheError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(PdfiumCacheError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| PdfiumCacheError::Download(format!("reading {url}: {e}")))
}

/// Unpack the single archive entry named `member` from a `.tgz` into `dest`.
fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumCacheError> {
    use flate2::read::GzDecoder;

    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| PdfiumCacheError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| PdfiumCacheError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.to_string_lossy() == member)
            .map_err(|e| PdfiumCacheError::Extract(e.to_string()))?;
        if matches {
            entry
                .unpack(dest)
                .map_err(|e| PdfiumCacheError::Extract(format!("unpack {member}: {e}")))?;
            return Ok(());
        }
    }

    Err(PdfiumCacheError::Extract(format!(
        "'{member}' not present in archive"
    )))
}
