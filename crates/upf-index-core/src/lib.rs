//! Core library for building a content-addressed index of UPF
//! pseudopotential files from checksum-verified archives.
//!
//! The pipeline reads a seed manifest, verifies and extracts each archive,
//! classifies members, hashes UPF data files by content and by
//! whitespace-insensitive "family" identity, resolves each file's chemical
//! element, extracts metadata through a staged fallback chain, optionally
//! overlays external cutoff hints, and emits a validated JSON index.
//!
//! # Example
//!
//! ```rust,ignore
//! use upf_index_core::{IndexerConfig, pipeline};
//!
//! fn main() -> upf_index_core::Result<()> {
//!     let config = IndexerConfig::new("/path/to/seed");
//!     let summary = pipeline::run(&config)?;
//!     println!(
//!         "{} unique files, {} occurrences",
//!         summary.unique_files, summary.occurrences
//!     );
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod attributes;
pub mod classify;
pub mod config;
pub mod elements;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod index;
pub mod manifest;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod sidecar;

// Re-export commonly used types
pub use archive::{ExtractedMember, VerifiedArchive};
pub use attributes::{Attr, AttrSource, AttributeRecord, PseudoType, Relativistic, XcFunctional};
pub use classify::{MemberClass, UpfFormat};
pub use config::IndexerConfig;
pub use error::{IndexError, Result};
pub use index::{ArchiveRef, FileIndex, FileRecord, IndexBuilder, ManifestRef, Occurrence};
pub use manifest::{LibraryTags, LoadedManifest, Manifest, ManifestEntry};
pub use pipeline::RunSummary;
pub use report::IndexReport;
