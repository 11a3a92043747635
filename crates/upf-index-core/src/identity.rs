//! Element identity resolution with consensus checking.
//!
//! Two independent extractors run per file: one over structured header
//! content (UPF v1 and v2 dialects), one over the filename. Agreement is
//! required when both produce a candidate: trusting a single heuristic risks
//! systematic mis-tagging, and preferring one side silently would hide real
//! data problems. A disagreement is a hard `IdentityConflict`, surfaced for
//! human review.

use crate::elements::normalize_symbol;
use crate::error::{IndexError, Result};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Separator characters accepted after a leading element token in a
/// filename. Observed naming-ecosystem convention, not a standard; treat as
/// adjustable policy.
const FILENAME_SEPARATORS: &str = r"[.\-_]";

/// UPF v2: `element="Br"` attribute inside the PP_HEADER tag.
static V2_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r#"<PP_HEADER[^>]*\belement=["']\s*([A-Za-z]{1,2})\s*["']"#)
        .case_insensitive(true)
        .build()
        .unwrap()
});

/// UPF v1: the whole `<PP_HEADER>...</PP_HEADER>` block.
static V1_HEADER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<PP_HEADER[^>]*>(.*?)</PP_HEADER>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

/// UPF v1: `"Al                   Element"` line inside the header block.
static V1_ELEMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^\s*([A-Za-z]{1,2})\s+Element\s*$")
        .case_insensitive(true)
        .build()
        .unwrap()
});

/// Fallback: `<PP_INPUTFILE>` generator block, first column `atsym` line.
static INPUTFILE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<PP_INPUTFILE>(.*?)</PP_INPUTFILE>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

static INPUTFILE_ATSYM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]{1,2})\s+\d").unwrap());

static FILENAME_LEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{1,2})").unwrap());

static FILENAME_BOUNDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^([A-Za-z]{{1,2}}){}", FILENAME_SEPARATORS)).unwrap()
});

/// Which signals produced the accepted identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Both,
    ContentOnly,
    FilenameOnly,
}

/// An accepted element identity, with an optional warning when only one
/// signal was available.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub element: String,
    pub source: IdentitySource,
    pub warning: Option<String>,
}

/// Parse the element symbol from structured UPF content.
///
/// Tries the v2 header attribute, then the v1 header `Element` line, then
/// the `PP_INPUTFILE` first-column fallback. The first candidate that
/// normalizes to a valid symbol wins.
pub fn element_from_content(content: &str) -> Option<String> {
    if let Some(cap) = V2_ELEMENT.captures(content) {
        if let Some(sym) = normalize_symbol(&cap[1]) {
            return Some(sym);
        }
    }

    if let Some(block) = V1_HEADER_BLOCK.captures(content) {
        for line in block[1].lines() {
            if let Some(cap) = V1_ELEMENT_LINE.captures(line) {
                if let Some(sym) = normalize_symbol(&cap[1]) {
                    return Some(sym);
                }
            }
        }
    }

    if let Some(block) = INPUTFILE_BLOCK.captures(content) {
        for line in block[1].lines() {
            if let Some(cap) = INPUTFILE_ATSYM_LINE.captures(line) {
                return normalize_symbol(&cap[1]);
            }
        }
    }

    None
}

/// Infer the element symbol from a filename by positional heuristics.
///
/// Handles `Si.pbe-...UPF`, `B-PBE.upf`, `b_pbe_v1.4.uspp.F.UPF` and bare
/// single-letter names like `B.upf`.
pub fn element_from_filename(filename: &str) -> Option<String> {
    let stem = match filename.rfind('.') {
        Some(pos) => &filename[..pos],
        None => filename,
    };

    if stem.len() == 1 && stem.chars().all(|c| c.is_ascii_alphabetic()) {
        return normalize_symbol(stem);
    }

    if let Some(cap) = FILENAME_LEADING.captures(stem) {
        if let Some(sym) = normalize_symbol(&cap[1]) {
            return Some(sym);
        }
    }

    if let Some(cap) = FILENAME_BOUNDED.captures(stem) {
        if let Some(sym) = normalize_symbol(&cap[1]) {
            return Some(sym);
        }
    }

    None
}

/// Combine the two signals under the consensus policy.
///
/// - neither present: `IdentityUnresolvable`
/// - one present: accept, with a warning naming the absent source
/// - both present and equal: accept
/// - both present and unequal: `IdentityConflict` naming both candidates
pub fn resolve(
    from_content: Option<String>,
    from_filename: Option<String>,
    archive: &str,
    path_in_archive: &str,
) -> Result<ResolvedIdentity> {
    match (from_content, from_filename) {
        (None, None) => Err(IndexError::IdentityUnresolvable {
            archive: archive.to_string(),
            path_in_archive: path_in_archive.to_string(),
        }),
        (Some(content_elem), None) => Ok(ResolvedIdentity {
            warning: Some(format!(
                "UPF file '{}' in archive '{}': could not infer element from filename, \
                 using file content: {}",
                path_in_archive, archive, content_elem
            )),
            element: content_elem,
            source: IdentitySource::ContentOnly,
        }),
        (None, Some(filename_elem)) => Ok(ResolvedIdentity {
            warning: Some(format!(
                "UPF file '{}' in archive '{}': could not parse element from file content, \
                 using filename: {}",
                path_in_archive, archive, filename_elem
            )),
            element: filename_elem,
            source: IdentitySource::FilenameOnly,
        }),
        (Some(content_elem), Some(filename_elem)) => {
            if content_elem == filename_elem {
                Ok(ResolvedIdentity {
                    element: content_elem,
                    source: IdentitySource::Both,
                    warning: None,
                })
            } else {
                Err(IndexError::IdentityConflict {
                    archive: archive.to_string(),
                    path_in_archive: path_in_archive.to_string(),
                    from_content: content_elem,
                    from_filename: filename_elem,
                })
            }
        }
    }
}
