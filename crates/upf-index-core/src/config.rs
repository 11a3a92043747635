//! Run configuration for the indexing pipeline.

use std::path::PathBuf;

/// Default manifest filename under the repo root.
pub const DEFAULT_MANIFEST_NAME: &str = "MANIFEST_PSEUDO_SEED.json";

/// Default output filename under the repo root.
pub const DEFAULT_INDEX_NAME: &str = "PSEUDO_FILE_INDEX.json";

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Directory the manifest's relative paths resolve against.
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub output_path: PathBuf,
    /// Directory holding sidecar cutoff-hint documents; `None` disables the
    /// external metadata overlay.
    pub sidecar_dir: Option<PathBuf>,
    /// Scratch area for archive extraction. `None` uses a throwaway temp
    /// directory reclaimed when the run ends.
    pub scratch_dir: Option<PathBuf>,
    /// Pinned generation timestamp (RFC 3339). `None` stamps the current
    /// time; pin it to make reruns byte-identical.
    pub fixed_timestamp: Option<String>,
}

impl IndexerConfig {
    /// Configuration rooted at `root` with the conventional file names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        IndexerConfig {
            manifest_path: root.join(DEFAULT_MANIFEST_NAME),
            output_path: root.join(DEFAULT_INDEX_NAME),
            sidecar_dir: None,
            scratch_dir: None,
            fixed_timestamp: None,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = IndexerConfig::new("/data/pseudos");
        assert_eq!(
            config.manifest_path,
            PathBuf::from("/data/pseudos/MANIFEST_PSEUDO_SEED.json")
        );
        assert_eq!(
            config.output_path,
            PathBuf::from("/data/pseudos/PSEUDO_FILE_INDEX.json")
        );
        assert!(config.sidecar_dir.is_none());
        assert!(config.fixed_timestamp.is_none());
    }
}
