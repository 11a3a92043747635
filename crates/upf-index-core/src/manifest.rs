//! Input manifest: the trusted record set of seed archives.
//!
//! Produced by an external collaborator that walks the seed directory; the
//! indexer treats it as an opaque contract. Entries carry the expected
//! SHA256 of each archive plus the library classification tags that get
//! copied onto every occurrence extracted from that archive.

use crate::error::{IndexError, Result};
use crate::hashing;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One manifest entry, typically an archive in the seed directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relative_path: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    #[serde(flatten)]
    pub tags: LibraryTags,
    #[serde(default)]
    pub upstream_urls: Option<Vec<String>>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Classification tags recorded in the manifest and copied into each
/// occurrence at extraction time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTags {
    pub category: Option<String>,
    pub library_name: Option<String>,
    pub library_version: Option<String>,
    pub relativistic: Option<String>,
    pub xc: Option<String>,
    pub quality: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// The whole manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub files: Vec<ManifestEntry>,
}

/// A loaded manifest pinned to its own content hash, so the emitted index
/// can reference exactly which manifest produced it.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub path: PathBuf,
    pub sha256: String,
}

/// Read and parse a manifest file, computing its content hash.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<LoadedManifest> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IndexError::FileNotFound(path.to_path_buf()));
    }

    let sha256 = hashing::sha256_file(path)?;
    let contents =
        std::fs::read_to_string(path).map_err(|e| IndexError::io_with_path(e, path))?;
    let manifest: Manifest = serde_json::from_str(&contents).map_err(|e| IndexError::Json {
        message: format!("Failed to parse manifest {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(LoadedManifest {
        manifest,
        path: path.to_path_buf(),
        sha256,
    })
}

/// Archive container suffixes the pipeline knows how to open.
const ARCHIVE_SUFFIXES: [&str; 4] = [".tar.gz", ".tgz", ".tar", ".zip"];

/// True when a manifest-relative path names an archive container.
///
/// The compound `.tar.gz` suffix must be checked before plain `.gz`-style
/// single-suffix logic would misread it.
pub fn is_archive_path(relative_path: &str) -> bool {
    let lower = relative_path.to_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}
