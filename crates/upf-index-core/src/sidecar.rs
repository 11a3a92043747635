//! Sidecar metadata overlay for PseudoDojo-style libraries.
//!
//! PseudoDojo publishes per-table cutoff hint documents beside its archives.
//! When one exists it is higher-trust than the in-file cutoff heuristics, so
//! its values overwrite the cutoff-recommendation fields (and nothing else).
//! A missing sidecar is not an error: the extractor's own values remain
//! authoritative.
//!
//! Hints are natively in Hartree; the index stores Rydberg (factor 2.0).

use crate::attributes::{AttrSource, AttributeRecord, Relativistic};
use crate::error::{IndexError, Result};
use crate::manifest::LibraryTags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hartree to Rydberg.
const HA_TO_RY: f64 = 2.0;

/// Cutoff hints for one element (or one relativistic variant).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CutoffHints {
    /// Lowest acceptable wavefunction cutoff.
    pub low: Option<f64>,
    /// Recommended wavefunction cutoff.
    pub normal: Option<f64>,
    /// Conservative wavefunction cutoff.
    pub high: Option<f64>,
}

/// One sidecar document.
///
/// `hints` is keyed by element symbol; full-relativistic variants live under
/// an `_r`-suffixed key (`"H_r"`). `by_basename` optionally maps exact UPF
/// basenames to hint keys for tables whose filenames diverge from plain
/// element naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarDoc {
    #[serde(default)]
    pub schema_version: Option<String>,
    /// `"hartree"` (default) or `"rydberg"`.
    #[serde(default)]
    pub units: Option<String>,
    /// Charge-density to wavefunction cutoff ratio, when the table
    /// prescribes a dual grid.
    #[serde(default)]
    pub dual_cutoff_ratio: Option<f64>,
    pub hints: BTreeMap<String, CutoffHints>,
    #[serde(default)]
    pub by_basename: Option<BTreeMap<String, String>>,
}

/// A loaded sidecar pinned to the file it came from, for provenance.
#[derive(Debug, Clone)]
pub struct Sidecar {
    pub doc: SidecarDoc,
    pub path: PathBuf,
}

/// Candidate sidecar filenames for an archive, in lookup order.
///
/// Primary: the deterministic transform from the archive's own name
/// (`nc-sr-04_pbe_standard_upf.tgz` -> `nc-sr-04_pbe_standard.djson`).
/// Fallback: reassembled from the manifest classification tags.
pub fn sidecar_candidates(archive_name: &str, tags: &LibraryTags) -> Vec<String> {
    let mut candidates = Vec::new();

    let mut base = archive_name.to_string();
    for suffix in [".tar.gz", ".tgz", ".tar", ".zip"] {
        if base.to_lowercase().ends_with(suffix) {
            base.truncate(base.len() - suffix.len());
            break;
        }
    }
    if let Some(stripped) = base.strip_suffix("_upf") {
        base = stripped.to_string();
    }
    candidates.push(format!("{}.djson", base));

    if let (Some(kind), Some(rel), Some(ver), Some(xc), Some(quality)) = (
        tags.kind.as_deref(),
        tags.relativistic.as_deref(),
        tags.library_version.as_deref(),
        tags.xc.as_deref(),
        tags.quality.as_deref(),
    ) {
        let assembled = format!("{}-{}-{}_{}_{}.djson", kind, rel, ver, xc, quality);
        if !candidates.contains(&assembled) {
            candidates.push(assembled);
        }
    }

    candidates
}

/// Look for a sidecar document for the given archive in `sidecar_dir`.
///
/// Returns `Ok(None)` when no candidate file exists; parse failures of an
/// existing file are real errors.
pub fn load_sidecar(
    sidecar_dir: &Path,
    archive_name: &str,
    tags: &LibraryTags,
) -> Result<Option<Sidecar>> {
    for candidate in sidecar_candidates(archive_name, tags) {
        let path = sidecar_dir.join(&candidate);
        if !path.exists() {
            continue;
        }
        let contents =
            std::fs::read_to_string(&path).map_err(|e| IndexError::io_with_path(e, &path))?;
        let doc: SidecarDoc = serde_json::from_str(&contents).map_err(|e| IndexError::Json {
            message: format!("Failed to parse sidecar {}: {}", path.display(), e),
            source: Some(e),
        })?;
        debug!("Loaded sidecar {} for archive {}", path.display(), archive_name);
        return Ok(Some(Sidecar { doc, path }));
    }

    debug!("No sidecar found for archive {}", archive_name);
    Ok(None)
}

fn unit_factor(doc: &SidecarDoc) -> f64 {
    match doc.units.as_deref().map(str::to_lowercase).as_deref() {
        Some("ry") | Some("rydberg") => 1.0,
        // Hartree is the native unit of the upstream tables.
        _ => HA_TO_RY,
    }
}

/// Overlay sidecar cutoff hints onto an extracted attribute record.
///
/// Lookup order: exact basename mapping, then the element key with an `_r`
/// suffix for full-relativistic records, then the bare element key. The
/// wavefunction cutoff takes `normal`, falling back to `low`, then `high`;
/// the charge-density cutoff is derived from it via `dual_cutoff_ratio`
/// when the table prescribes one. Only the cutoff-recommendation fields are
/// touched; everything else in the record is left as extracted. Returns
/// true when an overlay was applied.
pub fn merge_external(
    record: &mut AttributeRecord,
    sidecar: &Sidecar,
    filename: &str,
    element: &str,
) -> bool {
    let doc = &sidecar.doc;

    let key = doc
        .by_basename
        .as_ref()
        .and_then(|m| m.get(filename).cloned())
        .or_else(|| {
            let relativistic_key = format!("{}_r", element);
            if record.relativistic.value == Some(Relativistic::Full)
                && doc.hints.contains_key(&relativistic_key)
            {
                Some(relativistic_key)
            } else {
                Some(element.to_string())
            }
        });

    let Some(key) = key else {
        return false;
    };
    let Some(hints) = doc.hints.get(&key) else {
        debug!(
            "Sidecar {} has no entry for key '{}' (file {})",
            sidecar.path.display(),
            key,
            filename
        );
        return false;
    };

    let Some(wfc) = hints.normal.or(hints.low).or(hints.high) else {
        return false;
    };

    let factor = unit_factor(doc);
    let wfc_ry = wfc * factor;
    record.ecutwfc_ry.overwrite(wfc_ry, AttrSource::Sidecar);

    if let Some(ratio) = doc.dual_cutoff_ratio {
        record
            .ecutrho_ry
            .overwrite(wfc_ry * ratio, AttrSource::Sidecar);
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dojo_tags() -> LibraryTags {
        LibraryTags {
            category: Some("pseudo-dojo".into()),
            library_name: Some("PseudoDojo".into()),
            library_version: Some("04".into()),
            relativistic: Some("sr".into()),
            xc: Some("pbe".into()),
            quality: Some("standard".into()),
            kind: Some("nc".into()),
        }
    }

    #[test]
    fn test_candidate_name_transform() {
        let candidates = sidecar_candidates("nc-sr-04_pbe_standard_upf.tgz", &dojo_tags());
        assert_eq!(candidates[0], "nc-sr-04_pbe_standard.djson");
        assert_eq!(candidates.len(), 1); // fallback assembles to the same name
    }

    #[test]
    fn test_candidate_fallback_differs() {
        let candidates = sidecar_candidates("dojo_bundle.zip", &dojo_tags());
        assert_eq!(
            candidates,
            vec![
                "dojo_bundle.djson".to_string(),
                "nc-sr-04_pbe_standard.djson".to_string()
            ]
        );
    }

    #[test]
    fn test_missing_sidecar_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let found = load_sidecar(dir.path(), "nc-sr-04_pbe_standard_upf.tgz", &dojo_tags())
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_malformed_sidecar_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("nc-sr-04_pbe_standard.djson"), b"{ nope").unwrap();
        let err =
            load_sidecar(dir.path(), "nc-sr-04_pbe_standard_upf.tgz", &dojo_tags()).unwrap_err();
        assert!(matches!(err, IndexError::Json { .. }));
    }

    fn sidecar_with(hints: &[(&str, f64)], ratio: Option<f64>) -> Sidecar {
        let mut map = BTreeMap::new();
        for (key, normal) in hints {
            map.insert(
                key.to_string(),
                CutoffHints {
                    low: Some(normal - 4.0),
                    normal: Some(*normal),
                    high: Some(normal + 6.0),
                },
            );
        }
        Sidecar {
            doc: SidecarDoc {
                schema_version: None,
                units: None,
                dual_cutoff_ratio: ratio,
                hints: map,
                by_basename: None,
            },
            path: PathBuf::from("test.djson"),
        }
    }

    #[test]
    fn test_merge_converts_hartree_to_rydberg() {
        let sidecar = sidecar_with(&[("H", 20.0)], Some(4.0));
        let mut record = AttributeRecord::default();
        record.ecutwfc_ry.overwrite(30.0, AttrSource::PpInfo);

        assert!(merge_external(&mut record, &sidecar, "H.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(40.0)); // 20 Ha * 2
        assert_eq!(record.ecutwfc_ry.source, Some(AttrSource::Sidecar));
        assert_eq!(record.ecutrho_ry.value, Some(160.0)); // 40 Ry * 4
    }

    #[test]
    fn test_merge_prefers_relativistic_variant_key() {
        let sidecar = sidecar_with(&[("H", 20.0), ("H_r", 24.0)], None);
        let mut record = AttributeRecord::default();
        record
            .relativistic
            .overwrite(Relativistic::Full, AttrSource::HeaderV2);

        assert!(merge_external(&mut record, &sidecar, "H.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(48.0)); // 24 Ha * 2
        // Relativistic treatment itself is untouched by the merge.
        assert_eq!(record.relativistic.source, Some(AttrSource::HeaderV2));
    }

    #[test]
    fn test_merge_scalar_record_uses_bare_key() {
        let sidecar = sidecar_with(&[("H", 20.0), ("H_r", 24.0)], None);
        let mut record = AttributeRecord::default();
        record
            .relativistic
            .overwrite(Relativistic::Scalar, AttrSource::HeaderV2);

        assert!(merge_external(&mut record, &sidecar, "H.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(40.0));
    }

    #[test]
    fn test_merge_by_basename_overrides_element_key() {
        let mut sidecar = sidecar_with(&[("H", 20.0), ("special", 35.0)], None);
        let mut by_basename = BTreeMap::new();
        by_basename.insert("H-custom.upf".to_string(), "special".to_string());
        sidecar.doc.by_basename = Some(by_basename);

        let mut record = AttributeRecord::default();
        assert!(merge_external(&mut record, &sidecar, "H-custom.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(70.0));
    }

    #[test]
    fn test_merge_high_only_hint_is_used() {
        let mut map = BTreeMap::new();
        map.insert(
            "H".to_string(),
            CutoffHints {
                low: None,
                normal: None,
                high: Some(30.0),
            },
        );
        let sidecar = Sidecar {
            doc: SidecarDoc {
                schema_version: None,
                units: None,
                dual_cutoff_ratio: Some(2.0),
                hints: map,
                by_basename: None,
            },
            path: PathBuf::from("test.djson"),
        };
        let mut record = AttributeRecord::default();

        assert!(merge_external(&mut record, &sidecar, "H.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(60.0)); // 30 Ha * 2
        assert_eq!(record.ecutrho_ry.value, Some(120.0)); // 60 Ry * 2
        assert_eq!(record.ecutwfc_ry.source, Some(AttrSource::Sidecar));
    }

    #[test]
    fn test_merge_missing_entry_leaves_record_alone() {
        let sidecar = sidecar_with(&[("He", 20.0)], None);
        let mut record = AttributeRecord::default();
        record.ecutwfc_ry.overwrite(30.0, AttrSource::PpInfo);

        assert!(!merge_external(&mut record, &sidecar, "H.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(30.0));
        assert_eq!(record.ecutwfc_ry.source, Some(AttrSource::PpInfo));
    }

    #[test]
    fn test_rydberg_native_sidecar_skips_conversion() {
        let mut sidecar = sidecar_with(&[("H", 40.0)], None);
        sidecar.doc.units = Some("rydberg".into());
        let mut record = AttributeRecord::default();

        assert!(merge_external(&mut record, &sidecar, "H.upf", "H"));
        assert_eq!(record.ecutwfc_ry.value, Some(40.0));
    }
}
