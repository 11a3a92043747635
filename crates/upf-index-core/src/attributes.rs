//! Metadata extraction with an ordered fallback chain.
//!
//! Extraction never fails: unresolvable fields stay in an explicit unknown
//! state because partial metadata is expected and must not block indexing.
//! Four stages run in confidence order, each filling only fields still
//! unknown, and every populated field records which stage supplied it:
//!
//! 1. UPF v2 `<PP_HEADER>` typed attributes
//! 2. `<PP_INFO>` free-text heuristics
//! 3. UPF v1 legacy header block heuristics
//! 4. Filename family markers

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Which extraction stage supplied a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrSource {
    HeaderV2,
    PpInfo,
    HeaderV1,
    Filename,
    Sidecar,
}

/// One attribute value with its provenance. `value: None` is the explicit
/// unknown state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attr<T> {
    pub value: Option<T>,
    pub source: Option<AttrSource>,
}

impl<T> Default for Attr<T> {
    fn default() -> Self {
        Attr {
            value: None,
            source: None,
        }
    }
}

impl<T> Attr<T> {
    pub fn is_unknown(&self) -> bool {
        self.value.is_none()
    }

    /// Fill the field only when still unknown. Later, lower-confidence
    /// stages never overwrite earlier ones.
    fn fill(&mut self, value: T, source: AttrSource) {
        if self.value.is_none() {
            self.value = Some(value);
            self.source = Some(source);
        }
    }

    /// Unconditional overwrite, used by the sidecar merger only.
    pub fn overwrite(&mut self, value: T, source: AttrSource) {
        self.value = Some(value);
        self.source = Some(source);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PseudoType {
    NormConserving,
    Ultrasoft,
    Paw,
    Coulomb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relativistic {
    Scalar,
    Full,
    Nonrelativistic,
}

/// Closed set of canonical exchange-correlation functional labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XcFunctional {
    Pbe,
    Pbesol,
    Revpbe,
    Pw91,
    Blyp,
    Scan,
    Pz,
}

/// Normalized metadata record for one UPF file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub pseudo_type: Attr<PseudoType>,
    pub relativistic: Attr<Relativistic>,
    pub has_so: Attr<bool>,
    pub has_gipaw: Attr<bool>,
    pub paw_as_gipaw: Attr<bool>,
    pub core_correction: Attr<bool>,
    pub functional: Attr<XcFunctional>,
    pub z_valence: Attr<f64>,
    /// Recommended wavefunction cutoff, Rydberg.
    pub ecutwfc_ry: Attr<f64>,
    /// Recommended charge-density cutoff, Rydberg.
    pub ecutrho_ry: Attr<f64>,
}

/// Map a raw free-text functional label onto the canonical set.
///
/// Ordered substring rules with explicit precedence: labels that are textual
/// superstrings of more general ones (`pbesol`, `revpbe` vs `pbe`) must be
/// checked first.
pub fn normalize_functional(raw: &str) -> Option<XcFunctional> {
    const RULES: [(&str, XcFunctional); 9] = [
        ("pbesol", XcFunctional::Pbesol),
        ("pbe sol", XcFunctional::Pbesol),
        ("revpbe", XcFunctional::Revpbe),
        ("pw91", XcFunctional::Pw91),
        ("blyp", XcFunctional::Blyp),
        ("scan", XcFunctional::Scan),
        ("pbe", XcFunctional::Pbe),
        ("perdew-zunger", XcFunctional::Pz),
        ("lda", XcFunctional::Pz),
    ];

    let lower = raw.to_lowercase();
    RULES
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, xc)| *xc)
}

/// Extract the attribute record for one data file.
///
/// `content` is the (lossily decoded) file text, `filename` its basename.
pub fn extract(content: &str, filename: &str) -> AttributeRecord {
    let mut record = AttributeRecord::default();
    stage_header_v2(content, &mut record);
    stage_pp_info(content, &mut record);
    stage_header_v1(content, &mut record);
    stage_filename(filename, &mut record);
    record
}

// ---- stage 1: UPF v2 header attributes ----

static PP_HEADER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<PP_HEADER\b([^>]*)>")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static HEADER_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b([A-Za-z_]+)\s*=\s*["']([^"']*)["']"#).unwrap()
});

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "t" | "true" | ".true." => Some(true),
        "f" | "false" | ".false." => Some(false),
        _ => None,
    }
}

/// Parse a Fortran-style float (`4.00000000000e+00`, `1.2D+01`).
fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().replace(['d', 'D'], "e").parse().ok()
}

fn stage_header_v2(content: &str, record: &mut AttributeRecord) {
    let Some(cap) = PP_HEADER_TAG.captures(content) else {
        return;
    };
    let tag_body = &cap[1];
    // A v1 header is a bare `<PP_HEADER>` with no attribute payload.
    if !tag_body.contains('=') {
        return;
    }

    let mut is_ultrasoft = None;
    let mut is_paw = None;
    let mut is_coulomb = None;

    for attr in HEADER_ATTR.captures_iter(tag_body) {
        let key = attr[1].to_lowercase();
        let value = attr[2].trim();
        match key.as_str() {
            "pseudo_type" => {
                let pt = match value.to_lowercase().as_str() {
                    "nc" | "sl" => Some(PseudoType::NormConserving),
                    "us" | "uspp" => Some(PseudoType::Ultrasoft),
                    "paw" => Some(PseudoType::Paw),
                    "coulomb" | "1/r" => Some(PseudoType::Coulomb),
                    _ => None,
                };
                if let Some(pt) = pt {
                    record.pseudo_type.fill(pt, AttrSource::HeaderV2);
                }
            }
            "is_ultrasoft" => is_ultrasoft = parse_bool(value),
            "is_paw" => is_paw = parse_bool(value),
            "is_coulomb" => is_coulomb = parse_bool(value),
            "relativistic" => {
                let rel = match value.to_lowercase().as_str() {
                    "scalar" => Some(Relativistic::Scalar),
                    "full" => Some(Relativistic::Full),
                    "no" | "nonrelativistic" | "non-relativistic" => {
                        Some(Relativistic::Nonrelativistic)
                    }
                    _ => None,
                };
                if let Some(rel) = rel {
                    record.relativistic.fill(rel, AttrSource::HeaderV2);
                }
            }
            "has_so" => {
                if let Some(b) = parse_bool(value) {
                    record.has_so.fill(b, AttrSource::HeaderV2);
                }
            }
            "has_gipaw" => {
                if let Some(b) = parse_bool(value) {
                    record.has_gipaw.fill(b, AttrSource::HeaderV2);
                }
            }
            "paw_as_gipaw" => {
                if let Some(b) = parse_bool(value) {
                    record.paw_as_gipaw.fill(b, AttrSource::HeaderV2);
                }
            }
            "core_correction" => {
                if let Some(b) = parse_bool(value) {
                    record.core_correction.fill(b, AttrSource::HeaderV2);
                }
            }
            "functional" => {
                if let Some(xc) = normalize_functional(value) {
                    record.functional.fill(xc, AttrSource::HeaderV2);
                }
            }
            "z_valence" => {
                if let Some(z) = parse_float(value) {
                    record.z_valence.fill(z, AttrSource::HeaderV2);
                }
            }
            // Generators often write these as 0.0; only trust positives.
            "wfc_cutoff" => {
                if let Some(v) = parse_float(value).filter(|v| *v > 0.0) {
                    record.ecutwfc_ry.fill(v, AttrSource::HeaderV2);
                }
            }
            "rho_cutoff" => {
                if let Some(v) = parse_float(value).filter(|v| *v > 0.0) {
                    record.ecutrho_ry.fill(v, AttrSource::HeaderV2);
                }
            }
            _ => {}
        }
    }

    // Boolean capability flags refine the type when pseudo_type was absent.
    if record.pseudo_type.is_unknown() {
        match (is_paw, is_ultrasoft, is_coulomb) {
            (Some(true), _, _) => record.pseudo_type.fill(PseudoType::Paw, AttrSource::HeaderV2),
            (_, Some(true), _) => record
                .pseudo_type
                .fill(PseudoType::Ultrasoft, AttrSource::HeaderV2),
            (_, _, Some(true)) => record
                .pseudo_type
                .fill(PseudoType::Coulomb, AttrSource::HeaderV2),
            (Some(false), Some(false), _) => record
                .pseudo_type
                .fill(PseudoType::NormConserving, AttrSource::HeaderV2),
            _ => {}
        }
    }
}

// ---- stage 2: PP_INFO free-text block ----

static PP_INFO_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<PP_INFO>(.*?)</PP_INFO>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

static SUGGESTED_WFC_CUTOFF: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"suggested(?:\s+minimum)?\s+cutoff\s+for\s+wavefunctions?\s*:?\s*([0-9]+(?:\.[0-9]*)?)\s*ry")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static SUGGESTED_RHO_CUTOFF: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"suggested(?:\s+minimum)?\s+cutoff\s+for\s+charge\s+density\s*:?\s*([0-9]+(?:\.[0-9]*)?)\s*ry")
        .case_insensitive(true)
        .build()
        .unwrap()
});

fn pseudo_type_from_text(lower: &str) -> Option<PseudoType> {
    if lower.contains("projector augmented") || lower.contains("paw") {
        Some(PseudoType::Paw)
    } else if lower.contains("ultrasoft") {
        Some(PseudoType::Ultrasoft)
    } else if lower.contains("norm-conserving") || lower.contains("norm conserving") {
        Some(PseudoType::NormConserving)
    } else {
        None
    }
}

fn relativistic_from_text(lower: &str) -> Option<Relativistic> {
    if lower.contains("fully relativistic") || lower.contains("full-relativistic") {
        Some(Relativistic::Full)
    } else if lower.contains("scalar relativistic") || lower.contains("scalar-relativistic") {
        Some(Relativistic::Scalar)
    } else if lower.contains("nonrelativistic") || lower.contains("non-relativistic") {
        Some(Relativistic::Nonrelativistic)
    } else {
        None
    }
}

fn stage_pp_info(content: &str, record: &mut AttributeRecord) {
    let Some(cap) = PP_INFO_BLOCK.captures(content) else {
        return;
    };
    let info = &cap[1];
    let lower = info.to_lowercase();

    if let Some(pt) = pseudo_type_from_text(&lower) {
        record.pseudo_type.fill(pt, AttrSource::PpInfo);
    }
    if let Some(rel) = relativistic_from_text(&lower) {
        record.relativistic.fill(rel, AttrSource::PpInfo);
    }
    if let Some(xc) = normalize_functional(&lower) {
        record.functional.fill(xc, AttrSource::PpInfo);
    }
    if let Some(cap) = SUGGESTED_WFC_CUTOFF.captures(info) {
        if let Some(v) = parse_float(&cap[1]) {
            record.ecutwfc_ry.fill(v, AttrSource::PpInfo);
        }
    }
    if let Some(cap) = SUGGESTED_RHO_CUTOFF.captures(info) {
        if let Some(v) = parse_float(&cap[1]) {
            record.ecutrho_ry.fill(v, AttrSource::PpInfo);
        }
    }
}

// ---- stage 3: UPF v1 legacy header block ----

static V1_HEADER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<PP_HEADER[^>]*>(.*?)</PP_HEADER>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

static V1_Z_VALENCE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"([0-9]+(?:\.[0-9]*)?(?:[eEdD][+-]?[0-9]+)?)\s+Z valence")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static V1_WFC_CUTOFF: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"([0-9]+(?:\.[0-9]*)?)\s+Suggested cutoff for wfc")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static V1_RHO_CUTOFF: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"([0-9]+(?:\.[0-9]*)?)\s+Suggested cutoff for rho")
        .case_insensitive(true)
        .build()
        .unwrap()
});

fn stage_header_v1(content: &str, record: &mut AttributeRecord) {
    let Some(cap) = V1_HEADER_BLOCK.captures(content) else {
        return;
    };
    let header = &cap[1];
    let lower = header.to_lowercase();

    // Looser keyword matching: v1 headers carry a one-letter type marker
    // line ("US", "NC", "PAW") beside prose-style descriptions.
    let pt = pseudo_type_from_text(&lower).or_else(|| {
        header.lines().find_map(|line| {
            match line.split_whitespace().next() {
                Some("US") => Some(PseudoType::Ultrasoft),
                Some("NC") => Some(PseudoType::NormConserving),
                Some("PAW") => Some(PseudoType::Paw),
                _ => None,
            }
        })
    });
    if let Some(pt) = pt {
        record.pseudo_type.fill(pt, AttrSource::HeaderV1);
    }

    if let Some(rel) = relativistic_from_text(&lower) {
        record.relativistic.fill(rel, AttrSource::HeaderV1);
    }
    if let Some(xc) = normalize_functional(&lower) {
        record.functional.fill(xc, AttrSource::HeaderV1);
    }
    if let Some(cap) = V1_Z_VALENCE.captures(header) {
        if let Some(z) = parse_float(&cap[1]) {
            record.z_valence.fill(z, AttrSource::HeaderV1);
        }
    }
    if let Some(cap) = V1_WFC_CUTOFF.captures(header) {
        if let Some(v) = parse_float(&cap[1]) {
            record.ecutwfc_ry.fill(v, AttrSource::HeaderV1);
        }
    }
    if let Some(cap) = V1_RHO_CUTOFF.captures(header) {
        if let Some(v) = parse_float(&cap[1]) {
            record.ecutrho_ry.fill(v, AttrSource::HeaderV1);
        }
    }
}

// ---- stage 4: filename family markers ----

fn stage_filename(filename: &str, record: &mut AttributeRecord) {
    let lower = filename.to_lowercase();

    let pt = if lower.contains("kjpaw") || lower.contains("paw") {
        Some(PseudoType::Paw)
    } else if lower.contains("rrkjus") || lower.contains("uspp") || lower.contains("-us") || lower.contains("_us") {
        Some(PseudoType::Ultrasoft)
    } else if lower.contains("oncv") || lower.contains("dojo") || lower.contains("-nc") || lower.contains("_nc") {
        Some(PseudoType::NormConserving)
    } else {
        None
    };
    if let Some(pt) = pt {
        record.pseudo_type.fill(pt, AttrSource::Filename);
    }

    let rel = if lower.contains("rel-") || lower.contains("_fr") || lower.contains("-fr") {
        Some(Relativistic::Full)
    } else if lower.contains("_sr") || lower.contains("-sr") {
        Some(Relativistic::Scalar)
    } else {
        None
    };
    if let Some(rel) = rel {
        record.relativistic.fill(rel, AttrSource::Filename);
    }

    if let Some(xc) = normalize_functional(&lower) {
        record.functional.fill(xc, AttrSource::Filename);
    }
}
