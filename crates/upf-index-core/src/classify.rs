//! Member classification: UPF data files vs. incidental packaging content.
//!
//! Decision order: a `.upf` extension accepts immediately; anything else is
//! sniffed for UPF signature markers in its first 4KB. Archives ship readmes,
//! citation files and the occasional image alongside the data; those are
//! surfaced as warnings, never as index entries.

/// How many leading bytes to sniff for format markers.
const SNIFF_LEN: usize = 4096;

/// UPF signature markers looked for during content sniffing.
const UPF_MARKERS: [&str; 2] = ["<UPF", "<PP_HEADER"];

/// Classification of one extracted member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberClass {
    /// A UPF pseudopotential data file.
    DataFile,
    /// Anything else: readme, license, image, tooling script.
    Other,
}

/// Detected UPF sub-format of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpfFormat {
    Upf1,
    Upf2,
    Unknown,
}

impl std::fmt::Display for UpfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpfFormat::Upf1 => write!(f, "upf1"),
            UpfFormat::Upf2 => write!(f, "upf2"),
            UpfFormat::Unknown => write!(f, "unknown"),
        }
    }
}

fn sniff(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    String::from_utf8_lossy(head).into_owned()
}

fn has_upf_marker(bytes: &[u8]) -> bool {
    let head = sniff(bytes);
    UPF_MARKERS.iter().any(|m| head.contains(m))
}

/// Classify an extracted member by extension, then by content sniffing.
pub fn classify(path_in_archive: &str, bytes: &[u8]) -> MemberClass {
    let has_upf_ext = path_in_archive
        .rsplit('/')
        .next()
        .map(|name| name.to_lowercase().ends_with(".upf"))
        .unwrap_or(false);

    if has_upf_ext || has_upf_marker(bytes) {
        MemberClass::DataFile
    } else {
        MemberClass::Other
    }
}

/// Detect the UPF sub-format from the leading content.
///
/// Version 2 headers carry typed attributes (`element=`); version 1 headers
/// are bare `<PP_HEADER>` blocks of positional text.
pub fn detect_format(bytes: &[u8]) -> UpfFormat {
    let head = sniff(bytes);
    if head.contains("<PP_HEADER") && head.contains("element=") {
        UpfFormat::Upf2
    } else if head.contains("<PP_HEADER") {
        UpfFormat::Upf1
    } else {
        UpfFormat::Unknown
    }
}
