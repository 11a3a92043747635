//! Atomic index persistence.
//!
//! The index must never be partially visible: serialize to a temp file in
//! the target directory, validate by re-parsing, sync, then rename over the
//! target. Rename within one directory is atomic on the platforms we care
//! about.

use crate::error::{IndexError, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process;
use tracing::debug;

/// Write a JSON document atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| IndexError::io_with_path(e, parent))?;
        }
    }

    let temp_path = path.with_extension(format!("json.{}.tmp", process::id()));

    let serialized = serde_json::to_string_pretty(data).map_err(|e| IndexError::Json {
        message: format!("Failed to serialize index: {}", e),
        source: Some(e),
    })?;

    // Validate by re-parsing before anything touches the target path.
    serde_json::from_str::<serde_json::Value>(&serialized).map_err(|e| IndexError::Json {
        message: format!("JSON validation failed: {}", e),
        source: Some(e),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| IndexError::io_with_path(e, &temp_path))?;

        file.write_all(serialized.as_bytes())
            .map_err(|e| IndexError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| IndexError::io_with_path(e, &temp_path))?;
    }

    fs::rename(&temp_path, path).map_err(|e| IndexError::Io {
        message: format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        ),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        count: u32,
    }

    fn read_back(path: &Path) -> Doc {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_write_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let doc = Doc {
            name: "test".into(),
            count: 7,
        };

        atomic_write_json(&path, &doc).unwrap();
        assert!(path.exists());
        assert_eq!(read_back(&path), doc);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        atomic_write_json(&path, &Doc { name: "x".into(), count: 1 }).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out").join("index.json");
        atomic_write_json(&path, &Doc { name: "n".into(), count: 2 }).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        atomic_write_json(&path, &Doc { name: "first".into(), count: 1 }).unwrap();
        atomic_write_json(&path, &Doc { name: "second".into(), count: 2 }).unwrap();

        assert_eq!(read_back(&path).name, "second");
    }
}
