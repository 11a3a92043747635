//! Checksum-verified archive reading.
//!
//! Archives are opened only after their SHA256 matches the manifest's
//! expectation, then extracted into a caller-owned scratch area that is
//! emptied per archive. Extraction never surfaces macOS packaging artifacts
//! (`__MACOSX/`, `._*` resource-fork shadows).

use crate::error::{IndexError, Result};
use crate::hashing;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// An archive whose on-disk bytes matched the expected digest.
#[derive(Debug, Clone)]
pub struct VerifiedArchive {
    pub path: PathBuf,
    /// Basename of the archive file.
    pub name: String,
    /// Verified SHA256 (equals the manifest expectation).
    pub sha256: String,
}

/// One file pulled out of an archive. Ephemeral: bytes are dropped once the
/// member has been folded into the index tables.
#[derive(Debug, Clone)]
pub struct ExtractedMember {
    /// Path within the archive, `/`-separated.
    pub path_in_archive: String,
    pub bytes: Vec<u8>,
}

/// Container formats the reader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerFormat {
    Zip,
    Tar,
    TarGz,
}

fn detect_format(path: &Path) -> Option<ContainerFormat> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".zip") {
        Some(ContainerFormat::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ContainerFormat::TarGz)
    } else if name.ends_with(".tar") {
        Some(ContainerFormat::Tar)
    } else {
        None
    }
}

/// Read the archive fully, verify its SHA256 against the manifest
/// expectation, and return a handle for extraction.
pub fn open_and_verify(path: impl AsRef<Path>, expected_sha256: &str) -> Result<VerifiedArchive> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IndexError::FileNotFound(path.to_path_buf()));
    }

    let actual = hashing::sha256_file(path)?;
    let expected = expected_sha256.to_lowercase();
    if actual != expected {
        return Err(IndexError::IntegrityMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(VerifiedArchive {
        path: path.to_path_buf(),
        name,
        sha256: actual,
    })
}

/// Extract every member of a verified archive into `scratch_dir` and return
/// their bytes, sorted by path-in-archive.
///
/// The per-archive extraction root under `scratch_dir` is recreated from
/// empty each call; no archive's extraction observes another's leftovers.
pub fn extract_members(
    archive: &VerifiedArchive,
    scratch_dir: &Path,
) -> Result<Vec<ExtractedMember>> {
    let format = detect_format(&archive.path)
        .ok_or_else(|| IndexError::UnsupportedFormat(archive.path.clone()))?;

    let extract_root = scratch_dir.join(archive_stem(&archive.name));
    if extract_root.exists() {
        std::fs::remove_dir_all(&extract_root)
            .map_err(|e| IndexError::io_with_path(e, &extract_root))?;
    }
    std::fs::create_dir_all(&extract_root)
        .map_err(|e| IndexError::io_with_path(e, &extract_root))?;

    match format {
        ContainerFormat::Zip => extract_zip(&archive.path, &extract_root)?,
        ContainerFormat::Tar => extract_tar(&archive.path, &extract_root, false)?,
        ContainerFormat::TarGz => extract_tar(&archive.path, &extract_root, true)?,
    }

    collect_members(&extract_root)
}

/// Archive basename with container suffixes removed, used to name the
/// per-archive extraction root.
fn archive_stem(name: &str) -> String {
    let lower = name.to_lowercase();
    for suffix in [".tar.gz", ".tgz", ".tar", ".zip"] {
        if lower.ends_with(suffix) {
            return name[..name.len() - suffix.len()].to_string();
        }
    }
    name.to_string()
}

fn extract_zip(path: &Path, extract_root: &Path) -> Result<()> {
    let file = std::fs::File::open(path).map_err(|e| IndexError::io_with_path(e, path))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| IndexError::Other(format!(
        "Invalid zip archive {}: {}",
        path.display(),
        e
    )))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| IndexError::Other(format!(
            "Failed to read zip entry {} in {}: {}",
            i,
            path.display(),
            e
        )))?;

        // enclosed_name rejects entries that would escape the extraction root
        let outpath = match entry.enclosed_name() {
            Some(p) => extract_root.join(p),
            None => continue,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| IndexError::io_with_path(e, &outpath))?;
        } else {
            if let Some(parent) = outpath.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| IndexError::io_with_path(e, parent))?;
                }
            }
            let mut outfile = std::fs::File::create(&outpath)
                .map_err(|e| IndexError::io_with_path(e, &outpath))?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| IndexError::io_with_path(e, &outpath))?;
        }
    }

    Ok(())
}

fn extract_tar(path: &Path, extract_root: &Path, gzipped: bool) -> Result<()> {
    let file = std::fs::File::open(path).map_err(|e| IndexError::io_with_path(e, path))?;
    let reader = BufReader::new(file);

    let unpack = |mut archive: tar::Archive<Box<dyn std::io::Read>>| -> Result<()> {
        archive.unpack(extract_root).map_err(|e| IndexError::Io {
            message: format!("Failed to extract {}: {}", path.display(), e),
            path: Some(extract_root.to_path_buf()),
            source: Some(e),
        })
    };

    if gzipped {
        let decoder = flate2::read::GzDecoder::new(reader);
        unpack(tar::Archive::new(Box::new(decoder)))
    } else {
        unpack(tar::Archive::new(Box::new(reader)))
    }
}

/// Walk an extraction root and read every regular file, skipping platform
/// metadata artifacts.
fn collect_members(extract_root: &Path) -> Result<Vec<ExtractedMember>> {
    let mut members = Vec::new();

    for entry in WalkDir::new(extract_root).sort_by_file_name() {
        let entry = entry.map_err(|e| IndexError::Other(format!(
            "Failed to walk {}: {}",
            extract_root.display(),
            e
        )))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(extract_root)
            .map_err(|e| IndexError::Other(format!("Path outside extraction root: {}", e)))?;
        if is_platform_artifact(rel) {
            debug!("Skipping platform artifact: {}", rel.display());
            continue;
        }

        let bytes = std::fs::read(entry.path())
            .map_err(|e| IndexError::io_with_path(e, entry.path()))?;
        members.push(ExtractedMember {
            path_in_archive: slash_path(rel),
            bytes,
        });
    }

    members.sort_by(|a, b| a.path_in_archive.cmp(&b.path_in_archive));
    Ok(members)
}

/// macOS zip tooling ships `__MACOSX/` shadow trees and `._*` resource
/// forks; neither is archive content.
fn is_platform_artifact(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name == "__MACOSX" || name.starts_with("._") || name == ".DS_Store"
        }
        _ => false,
    })
}

/// Render a relative path with forward slashes regardless of platform.
fn slash_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::sha256_file;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (entry_name, bytes) in entries {
            writer
                .start_file(*entry_name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn write_tar_gz(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (entry_name, bytes) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, *entry_name, *bytes).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_open_and_verify_accepts_matching_hash() {
        let dir = TempDir::new().unwrap();
        let path = write_zip(dir.path(), "a.zip", &[("x.txt", b"hello")]);
        let digest = sha256_file(&path).unwrap();

        let archive = open_and_verify(&path, &digest).unwrap();
        assert_eq!(archive.name, "a.zip");
        assert_eq!(archive.sha256, digest);
    }

    #[test]
    fn test_open_and_verify_rejects_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_zip(dir.path(), "a.zip", &[("x.txt", b"hello")]);

        let err = open_and_verify(&path, &"0".repeat(64)).unwrap_err();
        assert!(matches!(err, IndexError::IntegrityMismatch { .. }));
    }

    #[test]
    fn test_open_and_verify_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = open_and_verify(dir.path().join("nope.zip"), "00").unwrap_err();
        assert!(matches!(err, IndexError::FileNotFound(_)));
    }

    #[test]
    fn test_extract_zip_members_sorted() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let path = write_zip(
            dir.path(),
            "lib.zip",
            &[
                ("sub/b.upf", b"<UPF version=\"2.0.1\">B</UPF>" as &[u8]),
                ("a.upf", b"<UPF version=\"2.0.1\">A</UPF>"),
            ],
        );
        let digest = sha256_file(&path).unwrap();
        let archive = open_and_verify(&path, &digest).unwrap();

        let members = extract_members(&archive, scratch.path()).unwrap();
        let paths: Vec<_> = members.iter().map(|m| m.path_in_archive.as_str()).collect();
        assert_eq!(paths, vec!["a.upf", "sub/b.upf"]);
    }

    #[test]
    fn test_extract_tar_gz_members() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let path = write_tar_gz(
            dir.path(),
            "lib_upf.tgz",
            &[("Si.upf", b"<PP_HEADER>Si</PP_HEADER>" as &[u8])],
        );
        let digest = sha256_file(&path).unwrap();
        let archive = open_and_verify(&path, &digest).unwrap();

        let members = extract_members(&archive, scratch.path()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].path_in_archive, "Si.upf");
        assert_eq!(members[0].bytes, b"<PP_HEADER>Si</PP_HEADER>");
    }

    #[test]
    fn test_extract_skips_macos_artifacts() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let path = write_zip(
            dir.path(),
            "lib.zip",
            &[
                ("H.upf", b"<UPF>H</UPF>" as &[u8]),
                ("__MACOSX/H.upf", b"junk"),
                ("._H.upf", b"junk"),
                (".DS_Store", b"junk"),
            ],
        );
        let digest = sha256_file(&path).unwrap();
        let archive = open_and_verify(&path, &digest).unwrap();

        let members = extract_members(&archive, scratch.path()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].path_in_archive, "H.upf");
    }

    #[test]
    fn test_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let path = dir.path().join("data.7z");
        std::fs::write(&path, b"not really").unwrap();
        let digest = sha256_file(&path).unwrap();
        let archive = open_and_verify(&path, &digest).unwrap();

        let err = extract_members(&archive, scratch.path()).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_scratch_is_recreated_between_extractions() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let path = write_zip(dir.path(), "lib.zip", &[("H.upf", b"<UPF>H</UPF>" as &[u8])]);
        let digest = sha256_file(&path).unwrap();
        let archive = open_and_verify(&path, &digest).unwrap();

        // Poison the extraction root with a leftover from a "previous" run
        let root = scratch.path().join("lib");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("leftover.upf"), b"<UPF>stale</UPF>").unwrap();

        let members = extract_members(&archive, scratch.path()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].path_in_archive, "H.upf");
    }
}
