//! Read-only coverage reporting over a built index.

use crate::index::FileIndex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How many sample basenames to show per library.
const SAMPLE_LIMIT: usize = 5;

/// Per-library aggregate.
#[derive(Debug, Default, Clone)]
pub struct LibraryStats {
    pub occurrence_count: usize,
    pub formats: BTreeSet<String>,
    pub basenames: BTreeSet<String>,
}

/// Aggregated classification and coverage statistics for one index.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub total_files: usize,
    pub total_occurrences: usize,
    pub warning_count: usize,
    pub libraries: BTreeMap<String, LibraryStats>,
    /// Unique file count per element.
    pub elements: BTreeMap<String, usize>,
}

impl IndexReport {
    pub fn from_index(index: &FileIndex) -> Self {
        let files_by_sha: BTreeMap<&str, &crate::index::FileRecord> =
            index.files.iter().map(|f| (f.sha256.as_str(), f)).collect();

        let mut libraries: BTreeMap<String, LibraryStats> = BTreeMap::new();
        for occ in &index.occurrences {
            let lib = occ
                .library
                .library_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            let stats = libraries.entry(lib).or_default();
            stats.occurrence_count += 1;
            if let Some(file) = files_by_sha.get(occ.sha256.as_str()) {
                stats.formats.insert(file.upf_format.to_string());
            }
            if let Some(basename) = occ.path_in_archive.rsplit('/').next() {
                stats.basenames.insert(basename.to_string());
            }
        }

        let mut elements: BTreeMap<String, usize> = BTreeMap::new();
        for file in &index.files {
            *elements.entry(file.element.clone()).or_default() += 1;
        }

        IndexReport {
            total_files: index.files.len(),
            total_occurrences: index.occurrences.len(),
            warning_count: index.warnings.as_ref().map(Vec::len).unwrap_or(0),
            libraries,
            elements,
        }
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(80))?;
        writeln!(f, "PSEUDOPOTENTIAL FILE INDEX")?;
        writeln!(f, "{}", "=".repeat(80))?;
        writeln!(f, "Unique files:     {}", self.total_files)?;
        writeln!(f, "Occurrences:      {}", self.total_occurrences)?;
        writeln!(f, "Elements covered: {}", self.elements.len())?;
        writeln!(f, "Warnings:         {}", self.warning_count)?;

        writeln!(f, "\nLibrary distribution:")?;
        for (lib, stats) in &self.libraries {
            let formats: Vec<_> = stats.formats.iter().map(String::as_str).collect();
            writeln!(
                f,
                "  {:15} {:4} occurrence(s), formats: [{}]",
                lib,
                stats.occurrence_count,
                formats.join(", ")
            )?;
        }

        writeln!(f, "\nSample filenames by library:")?;
        for (lib, stats) in &self.libraries {
            writeln!(f, "  {}:", lib)?;
            for basename in stats.basenames.iter().take(SAMPLE_LIMIT) {
                writeln!(f, "    - {}", basename)?;
            }
            if stats.basenames.len() > SAMPLE_LIMIT {
                writeln!(f, "    ... and {} more", stats.basenames.len() - SAMPLE_LIMIT)?;
            }
        }

        write!(f, "{}", "=".repeat(80))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeRecord;
    use crate::classify::UpfFormat;
    use crate::index::{ArchiveRef, FileRecord, ManifestRef, Occurrence};
    use crate::manifest::LibraryTags;

    fn sample_index() -> FileIndex {
        let file = |sha: &str, element: &str, name: &str| FileRecord {
            sha256: sha.to_string(),
            sha_family: "f".repeat(64),
            element: element.to_string(),
            size_bytes: 10,
            upf_format: UpfFormat::Upf2,
            attributes: AttributeRecord::default(),
            basenames: vec![name.to_string()],
        };
        let occ = |sha: &str, lib: &str, path: &str| Occurrence {
            sha256: sha.to_string(),
            archive: ArchiveRef {
                name: "a.zip".into(),
                relative_path: "pseudo_seed/a.zip".into(),
                sha256: "c".repeat(64),
            },
            path_in_archive: path.to_string(),
            library: LibraryTags {
                library_name: Some(lib.to_string()),
                ..Default::default()
            },
        };

        FileIndex {
            schema_version: crate::index::SCHEMA_VERSION.into(),
            generated_at: "2026-01-01T00:00:00Z".into(),
            source_manifest: ManifestRef {
                path: "MANIFEST.json".into(),
                sha256: "d".repeat(64),
            },
            files: vec![
                file(&"a".repeat(64), "H", "H.upf"),
                file(&"b".repeat(64), "Si", "Si.upf"),
            ],
            occurrences: vec![
                occ(&"a".repeat(64), "SSSP", "H.upf"),
                occ(&"b".repeat(64), "SSSP", "Si.upf"),
                occ(&"b".repeat(64), "PseudoDojo", "sub/Si.upf"),
            ],
            warnings: Some(vec!["one warning".into()]),
        }
    }

    #[test]
    fn test_report_aggregates() {
        let report = IndexReport::from_index(&sample_index());
        assert_eq!(report.total_files, 2);
        assert_eq!(report.total_occurrences, 3);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.elements.get("H"), Some(&1));
        assert_eq!(report.elements.get("Si"), Some(&1));
        assert_eq!(report.libraries["SSSP"].occurrence_count, 2);
        assert_eq!(report.libraries["PseudoDojo"].occurrence_count, 1);
        assert!(report.libraries["SSSP"].formats.contains("upf2"));
    }

    #[test]
    fn test_report_display_renders() {
        let report = IndexReport::from_index(&sample_index());
        let rendered = report.to_string();
        assert!(rendered.contains("Unique files:     2"));
        assert!(rendered.contains("SSSP"));
        assert!(rendered.contains("- Si.upf"));
    }
}
