//! The end-to-end indexing pipeline.
//!
//! One logical pass over the manifest's archive entries: verify, extract,
//! classify, hash, resolve identity, extract attributes, overlay sidecar
//! metadata, accumulate. All-or-nothing: any hard error aborts the run and
//! no index is written. Scratch extraction space is reclaimed on both the
//! success and failure paths.

use crate::archive::{self, ExtractedMember, VerifiedArchive};
use crate::attributes;
use crate::classify::{self, MemberClass};
use crate::config::IndexerConfig;
use crate::error::{IndexError, Result};
use crate::hashing;
use crate::identity;
use crate::index::{ArchiveRef, FileIndex, IndexBuilder, ManifestRef};
use crate::manifest::{self, ManifestEntry};
use crate::persist;
use crate::sidecar::{self, Sidecar};
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifest category whose archives get the sidecar overlay.
const SIDECAR_CATEGORY: &str = "pseudo-dojo";

/// How many unclassified member paths to name in a warning.
const OTHER_MEMBER_SAMPLE: usize = 10;

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunSummary {
    pub archives_processed: usize,
    pub data_files_scanned: usize,
    pub unique_files: usize,
    pub occurrences: usize,
    pub warnings: usize,
    pub output_path: PathBuf,
    pub index: FileIndex,
}

/// Scratch extraction space: either a throwaway temp directory or a
/// caller-designated one. Both are fully reclaimed when dropped.
enum Scratch {
    Temp(tempfile::TempDir),
    Owned(PathBuf),
}

impl Scratch {
    fn create(config: &IndexerConfig) -> Result<Self> {
        match &config.scratch_dir {
            Some(dir) => {
                // Start from empty so no previous run's leftovers survive.
                if dir.exists() {
                    std::fs::remove_dir_all(dir)
                        .map_err(|e| IndexError::io_with_path(e, dir))?;
                }
                std::fs::create_dir_all(dir).map_err(|e| IndexError::io_with_path(e, dir))?;
                Ok(Scratch::Owned(dir.clone()))
            }
            None => {
                let temp = tempfile::TempDir::new().map_err(IndexError::from)?;
                Ok(Scratch::Temp(temp))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            Scratch::Temp(t) => t.path(),
            Scratch::Owned(p) => p,
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Scratch::Owned(path) = self {
            if path.exists() {
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    warn!("Failed to reclaim scratch dir {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Run the whole pipeline per the given configuration.
///
/// On success the index has been validated and atomically written to
/// `config.output_path`. On any error nothing has been written.
pub fn run(config: &IndexerConfig) -> Result<RunSummary> {
    let loaded = manifest::load_manifest(&config.manifest_path)?;
    info!(
        "Loaded manifest {} ({} entries, sha256 {})",
        loaded.path.display(),
        loaded.manifest.files.len(),
        &loaded.sha256[..12]
    );

    let manifest_ref = ManifestRef {
        path: loaded
            .path
            .strip_prefix(&config.root)
            .unwrap_or(&loaded.path)
            .to_string_lossy()
            .into_owned(),
        sha256: loaded.sha256.clone(),
    };
    let mut builder = IndexBuilder::new(manifest_ref);

    let scratch = Scratch::create(config)?;

    let mut entries: Vec<&ManifestEntry> = loaded
        .manifest
        .files
        .iter()
        .filter(|e| manifest::is_archive_path(&e.relative_path))
        .collect();
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut archives_processed = 0usize;
    let mut data_files_scanned = 0usize;

    for entry in entries {
        archives_processed += 1;
        process_archive(
            config,
            entry,
            scratch.path(),
            &mut builder,
            &mut data_files_scanned,
        )?;
    }

    let generated_at = match &config.fixed_timestamp {
        Some(ts) => ts.clone(),
        None => Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    };

    let index = builder.finish(generated_at)?;
    persist::atomic_write_json(&config.output_path, &index)?;
    info!("Index written to {}", config.output_path.display());

    Ok(RunSummary {
        archives_processed,
        data_files_scanned,
        unique_files: index.files.len(),
        occurrences: index.occurrences.len(),
        warnings: index.warnings.as_ref().map(Vec::len).unwrap_or(0),
        output_path: config.output_path.clone(),
        index,
    })
}

/// Verify, extract and fold one archive into the builder.
fn process_archive(
    config: &IndexerConfig,
    entry: &ManifestEntry,
    scratch: &Path,
    builder: &mut IndexBuilder,
    data_files_scanned: &mut usize,
) -> Result<()> {
    let archive_path = config.root.join(&entry.relative_path);
    let expected_sha256 = entry.sha256.as_deref().ok_or_else(|| IndexError::Config {
        message: format!("Manifest entry missing sha256: {}", entry.relative_path),
    })?;

    let archive = archive::open_and_verify(&archive_path, expected_sha256)?;
    info!("Verified archive {}", archive.name);
    builder.begin_archive(&archive.name);

    let members = archive::extract_members(&archive, scratch)?;
    debug!("Extracted {} member(s) from {}", members.len(), archive.name);

    let mut data_files: Vec<&ExtractedMember> = Vec::new();
    let mut other_paths: Vec<&str> = Vec::new();
    for member in &members {
        match classify::classify(&member.path_in_archive, &member.bytes) {
            MemberClass::DataFile => data_files.push(member),
            MemberClass::Other => other_paths.push(&member.path_in_archive),
        }
    }

    if !other_paths.is_empty() {
        let sample: Vec<&str> = other_paths
            .iter()
            .take(OTHER_MEMBER_SAMPLE)
            .copied()
            .collect();
        let rest = other_paths.len().saturating_sub(OTHER_MEMBER_SAMPLE);
        let mut warning = format!(
            "Archive '{}' contains {} non-UPF file(s): {}",
            entry.relative_path,
            other_paths.len(),
            sample.join(", ")
        );
        if rest > 0 {
            warning.push_str(&format!(" ... and {} more", rest));
        }
        builder.push_warning(warning);
    }

    if data_files.is_empty() {
        return Err(IndexError::NoDataFiles {
            archive: entry.relative_path.clone(),
        });
    }

    let sidecar = load_sidecar_for(config, entry, &archive)?;

    let archive_ref = ArchiveRef {
        name: archive.name.clone(),
        relative_path: entry.relative_path.clone(),
        sha256: archive.sha256.clone(),
    };

    for member in data_files {
        *data_files_scanned += 1;
        process_member(member, entry, &archive_ref, sidecar.as_ref(), builder)?;
    }

    Ok(())
}

fn load_sidecar_for(
    config: &IndexerConfig,
    entry: &ManifestEntry,
    archive: &VerifiedArchive,
) -> Result<Option<Sidecar>> {
    let Some(dir) = &config.sidecar_dir else {
        return Ok(None);
    };
    if entry.tags.category.as_deref() != Some(SIDECAR_CATEGORY) {
        return Ok(None);
    }
    sidecar::load_sidecar(dir, &archive.name, &entry.tags)
}

/// Hash, resolve and accumulate one data file.
fn process_member(
    member: &ExtractedMember,
    entry: &ManifestEntry,
    archive_ref: &ArchiveRef,
    sidecar: Option<&Sidecar>,
    builder: &mut IndexBuilder,
) -> Result<()> {
    let sha256 = hashing::sha256_bytes(&member.bytes);
    let text = String::from_utf8_lossy(&member.bytes);

    let sha_family =
        hashing::sha256_canonical_text(&text).map_err(|e| match e {
            IndexError::EmptyCanonicalText { .. } => IndexError::EmptyCanonicalText {
                context: format!(
                    "'{}' in archive '{}'",
                    member.path_in_archive, entry.relative_path
                ),
            },
            other => other,
        })?;

    let basename = member
        .path_in_archive
        .rsplit('/')
        .next()
        .unwrap_or(&member.path_in_archive);

    let resolved = identity::resolve(
        identity::element_from_content(&text),
        identity::element_from_filename(basename),
        &entry.relative_path,
        &member.path_in_archive,
    )?;
    if let Some(warning) = resolved.warning {
        warn!("{}", warning);
        builder.push_warning(warning);
    }

    let mut attrs = attributes::extract(&text, basename);
    if let Some(sidecar) = sidecar {
        let applied = sidecar::merge_external(&mut attrs, sidecar, basename, &resolved.element);
        if applied {
            debug!(
                "Sidecar overlay applied to {} ({})",
                member.path_in_archive, resolved.element
            );
        }
    }

    builder.add_occurrence(
        sha256,
        sha_family,
        resolved.element,
        member.bytes.len() as u64,
        classify::detect_format(&member.bytes),
        attrs,
        archive_ref.clone(),
        member.path_in_archive.clone(),
        entry.tags.clone(),
    );

    Ok(())
}
