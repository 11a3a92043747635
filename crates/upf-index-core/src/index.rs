//! Deduplicated file index: accumulation, invariants, deterministic output.
//!
//! The builder owns the only mutable tables in the pipeline. Content hashes
//! key the file table; the occurrence table records every location a given
//! content was seen. Identity and attributes bind on first sight and never
//! change afterward — later occurrences of the same hash only contribute
//! basenames and occurrence rows.

use crate::attributes::AttributeRecord;
use crate::classify::UpfFormat;
use crate::manifest::LibraryTags;
use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Index document schema version.
pub const SCHEMA_VERSION: &str = "1.2.0";

/// One distinct file content, keyed by SHA256.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub sha256: String,
    /// SHA256 over the whitespace-stripped text; formatting-only duplicates
    /// share this value.
    pub sha_family: String,
    pub element: String,
    pub size_bytes: u64,
    pub upf_format: UpfFormat,
    pub attributes: AttributeRecord,
    /// Distinct basenames this content has been observed under, sorted.
    pub basenames: Vec<String>,
}

/// Back-reference to the archive an occurrence came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRef {
    pub name: String,
    pub relative_path: String,
    pub sha256: String,
}

/// One concrete location where some content was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    pub sha256: String,
    pub archive: ArchiveRef,
    pub path_in_archive: String,
    pub library: LibraryTags,
}

/// Back-reference to the manifest that drove the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRef {
    pub path: String,
    pub sha256: String,
}

/// The final emitted index. Immutable after emission; re-running the
/// pipeline regenerates it from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndex {
    pub schema_version: String,
    pub generated_at: String,
    pub source_manifest: ManifestRef,
    pub files: Vec<FileRecord>,
    pub occurrences: Vec<Occurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// Accumulator for file records and occurrences across all archives.
#[derive(Debug)]
pub struct IndexBuilder {
    source_manifest: ManifestRef,
    files: BTreeMap<String, FileRecord>,
    basenames: BTreeMap<String, BTreeSet<String>>,
    occurrences: Vec<Occurrence>,
    /// Archives handed to the builder, for the zero-occurrence check.
    processed_archives: BTreeSet<String>,
    warnings: Vec<String>,
}

impl IndexBuilder {
    pub fn new(source_manifest: ManifestRef) -> Self {
        IndexBuilder {
            source_manifest,
            files: BTreeMap::new(),
            basenames: BTreeMap::new(),
            occurrences: Vec::new(),
            processed_archives: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Register an archive as processed before any of its members are added,
    /// so the zero-occurrence invariant can be enforced at finish time.
    pub fn begin_archive(&mut self, archive_name: &str) {
        self.processed_archives.insert(archive_name.to_string());
    }

    /// Record one member occurrence.
    ///
    /// First sight of a content hash creates the file record and binds
    /// element and attributes permanently; repeats only accumulate the
    /// basename and append the occurrence row.
    #[allow(clippy::too_many_arguments)]
    pub fn add_occurrence(
        &mut self,
        sha256: String,
        sha_family: String,
        element: String,
        size_bytes: u64,
        upf_format: UpfFormat,
        attributes: AttributeRecord,
        archive: ArchiveRef,
        path_in_archive: String,
        library: LibraryTags,
    ) {
        let basename = path_in_archive
            .rsplit('/')
            .next()
            .unwrap_or(&path_in_archive)
            .to_string();

        self.files.entry(sha256.clone()).or_insert(FileRecord {
            sha256: sha256.clone(),
            sha_family,
            element,
            size_bytes,
            upf_format,
            attributes,
            basenames: Vec::new(),
        });
        self.basenames
            .entry(sha256.clone())
            .or_default()
            .insert(basename);

        self.occurrences.push(Occurrence {
            sha256,
            archive,
            path_in_archive,
            library,
        });
    }

    pub fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Sort both tables deterministically, validate the closure invariants,
    /// and emit the final index.
    pub fn finish(self, generated_at: String) -> Result<FileIndex> {
        let IndexBuilder {
            source_manifest,
            files,
            basenames,
            mut occurrences,
            processed_archives,
            warnings,
        } = self;

        let mut files: Vec<FileRecord> = files
            .into_values()
            .map(|mut record| {
                if let Some(names) = basenames.get(&record.sha256) {
                    record.basenames = names.iter().cloned().collect();
                }
                record
            })
            .collect();

        // FileRecords by (element, first basename, sha256); occurrences by
        // (archive name, path-in-archive, sha256). Stable, byte-identical
        // output across runs on identical inputs.
        files.sort_by(|a, b| {
            let a_name = a.basenames.first().map(String::as_str).unwrap_or("");
            let b_name = b.basenames.first().map(String::as_str).unwrap_or("");
            (a.element.as_str(), a_name, a.sha256.as_str())
                .cmp(&(b.element.as_str(), b_name, b.sha256.as_str()))
        });
        occurrences.sort_by(|a, b| {
            (
                a.archive.name.as_str(),
                a.path_in_archive.as_str(),
                a.sha256.as_str(),
            )
                .cmp(&(
                    b.archive.name.as_str(),
                    b.path_in_archive.as_str(),
                    b.sha256.as_str(),
                ))
        });

        validate(&files, &occurrences, &processed_archives)?;

        Ok(FileIndex {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            source_manifest,
            files,
            occurrences,
            warnings: if warnings.is_empty() {
                None
            } else {
                Some(warnings)
            },
        })
    }
}

/// Closure validation over the sorted tables. Collects every violation
/// rather than stopping at the first.
fn validate(
    files: &[FileRecord],
    occurrences: &[Occurrence],
    processed_archives: &BTreeSet<String>,
) -> Result<()> {
    let mut failures = Vec::new();

    let known_hashes: BTreeSet<&str> = files.iter().map(|f| f.sha256.as_str()).collect();
    for occ in occurrences {
        if !known_hashes.contains(occ.sha256.as_str()) {
            failures.push(format!(
                "Occurrence references missing sha256: {} (archive: {}, path: {})",
                occ.sha256, occ.archive.name, occ.path_in_archive
            ));
        }
    }

    for file in files {
        if file.basenames.is_empty() {
            failures.push(format!(
                "File with sha256 {} has empty basenames list",
                file.sha256
            ));
        }
        if file.sha_family.len() != 64 {
            failures.push(format!(
                "File with sha256 {} has invalid sha_family length: {} (expected 64)",
                file.sha256,
                file.sha_family.len()
            ));
        } else if !file
            .sha_family
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            failures.push(format!(
                "File with sha256 {} has invalid sha_family format (not lowercase hex)",
                file.sha256
            ));
        }
    }

    let archives_with_occurrences: BTreeSet<&str> =
        occurrences.iter().map(|o| o.archive.name.as_str()).collect();
    for archive in processed_archives {
        if !archives_with_occurrences.contains(archive.as_str()) {
            failures.push(format!("Archive '{}' has zero occurrences", archive));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(IndexError::Validation { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttrSource, AttributeRecord};
    use crate::hashing::sha256_bytes;

    fn archive_ref(name: &str) -> ArchiveRef {
        ArchiveRef {
            name: name.to_string(),
            relative_path: format!("pseudo_seed/{}", name),
            sha256: "c".repeat(64),
        }
    }

    fn manifest_ref() -> ManifestRef {
        ManifestRef {
            path: "MANIFEST_PSEUDO_SEED.json".into(),
            sha256: "d".repeat(64),
        }
    }

    fn add_file(builder: &mut IndexBuilder, content: &[u8], element: &str, path: &str, arch: &str) {
        builder.add_occurrence(
            sha256_bytes(content),
            sha256_bytes(content), // stands in for the canonical hash in tests
            element.to_string(),
            content.len() as u64,
            UpfFormat::Upf2,
            AttributeRecord::default(),
            archive_ref(arch),
            path.to_string(),
            LibraryTags::default(),
        );
    }

    #[test]
    fn test_first_seen_wins() {
        let mut builder = IndexBuilder::new(manifest_ref());
        builder.begin_archive("a.zip");

        let mut attrs = AttributeRecord::default();
        attrs.z_valence.overwrite(4.0, AttrSource::HeaderV2);
        let content = b"<UPF>same bytes</UPF>";

        builder.add_occurrence(
            sha256_bytes(content),
            sha256_bytes(content),
            "Si".into(),
            content.len() as u64,
            UpfFormat::Upf2,
            attrs,
            archive_ref("a.zip"),
            "Si.upf".into(),
            LibraryTags::default(),
        );
        // Same content seen again under a different name with different
        // attributes (and even different manifest tags): must not rebind.
        let mut other_attrs = AttributeRecord::default();
        other_attrs.z_valence.overwrite(99.0, AttrSource::Filename);
        builder.add_occurrence(
            sha256_bytes(content),
            sha256_bytes(content),
            "Si".into(),
            content.len() as u64,
            UpfFormat::Upf1,
            other_attrs,
            archive_ref("a.zip"),
            "sub/Si-copy.upf".into(),
            LibraryTags {
                quality: Some("stringent".into()),
                ..Default::default()
            },
        );

        let index = builder.finish("2026-01-01T00:00:00Z".into()).unwrap();
        assert_eq!(index.files.len(), 1);
        assert_eq!(index.occurrences.len(), 2);

        let file = &index.files[0];
        assert_eq!(file.attributes.z_valence.value, Some(4.0));
        assert_eq!(file.upf_format, UpfFormat::Upf2);
        assert_eq!(file.basenames, vec!["Si-copy.upf", "Si.upf"]);
    }

    #[test]
    fn test_deterministic_ordering() {
        let build = || {
            let mut builder = IndexBuilder::new(manifest_ref());
            builder.begin_archive("z.zip");
            builder.begin_archive("a.zip");
            add_file(&mut builder, b"content-si", "Si", "Si.upf", "z.zip");
            add_file(&mut builder, b"content-al", "Al", "Al.upf", "a.zip");
            add_file(&mut builder, b"content-h", "H", "H.upf", "a.zip");
            builder.finish("2026-01-01T00:00:00Z".into()).unwrap()
        };

        let first = serde_json::to_string_pretty(&build()).unwrap();
        let second = serde_json::to_string_pretty(&build()).unwrap();
        assert_eq!(first, second);

        let index = build();
        let elements: Vec<_> = index.files.iter().map(|f| f.element.as_str()).collect();
        assert_eq!(elements, vec!["Al", "H", "Si"]);
        let archives: Vec<_> = index
            .occurrences
            .iter()
            .map(|o| o.archive.name.as_str())
            .collect();
        assert_eq!(archives, vec!["a.zip", "a.zip", "z.zip"]);
    }

    #[test]
    fn test_validation_rejects_zero_occurrence_archive() {
        let mut builder = IndexBuilder::new(manifest_ref());
        builder.begin_archive("a.zip");
        builder.begin_archive("empty.zip");
        add_file(&mut builder, b"content", "H", "H.upf", "a.zip");

        let err = builder.finish("2026-01-01T00:00:00Z".into()).unwrap_err();
        match err {
            IndexError::Validation { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("empty.zip"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_rejects_bad_sha_family() {
        let mut builder = IndexBuilder::new(manifest_ref());
        builder.begin_archive("a.zip");
        builder.add_occurrence(
            sha256_bytes(b"x"),
            "ABC123".into(), // wrong length and case
            "H".into(),
            1,
            UpfFormat::Unknown,
            AttributeRecord::default(),
            archive_ref("a.zip"),
            "H.upf".into(),
            LibraryTags::default(),
        );

        let err = builder.finish("2026-01-01T00:00:00Z".into()).unwrap_err();
        assert!(matches!(err, IndexError::Validation { .. }));
    }

    #[test]
    fn test_warnings_omitted_when_empty() {
        let mut builder = IndexBuilder::new(manifest_ref());
        builder.begin_archive("a.zip");
        add_file(&mut builder, b"content", "H", "H.upf", "a.zip");
        let index = builder.finish("2026-01-01T00:00:00Z".into()).unwrap();
        assert!(index.warnings.is_none());
        assert_eq!(index.schema_version, SCHEMA_VERSION);
    }
}
