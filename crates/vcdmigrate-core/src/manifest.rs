//! OVF manifest refresh.
//!
//! `ovftool` writes a `<name>.mf` manifest next to the descriptor with one
//! digest per file:
//!
//! ```text
//! SHA256(web01.ovf)= 6c1f...
//! SHA256(web01-disk1.vmdk)= 0a9b...
//! ```
//!
//! Once the descriptor has been flattened its digest no longer matches, so the
//! descriptor entry is recomputed.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::fsutil::atomic_replace;

/// Digest algorithms that can be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Parse the algorithm name used in manifest entries.
    pub fn from_manifest_name(name: &str) -> Option<Self> {
        match name {
            "SHA256" => Some(Self::Sha256),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Compute a lowercase hex digest.
pub fn compute_digest(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
        DigestAlgorithm::Sha512 => format!("{:x}", Sha512::digest(data)),
    }
}

/// One `ALGO(file)= digest` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry<'a> {
    pub algorithm: &'a str,
    pub file: &'a str,
    pub digest: &'a str,
}

/// Parse a manifest line. Returns `None` for lines that are not entries.
pub fn parse_entry(line: &str) -> Option<ManifestEntry<'_>> {
    let line = line.trim();
    let open = line.find('(')?;
    let close = line.rfind(")=")?;
    if close < open {
        return None;
    }
    Some(ManifestEntry {
        algorithm: line[..open].trim(),
        file: &line[open + 1..close],
        digest: line[close + 2..].trim(),
    })
}

/// What happened to the descriptor's manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    /// No manifest next to the descriptor.
    Missing,
    /// The manifest has no entry for the descriptor.
    NoEntry,
    /// The descriptor digest was recomputed.
    Updated { algorithm: DigestAlgorithm },
    /// The entry used an algorithm that cannot be recomputed and was removed.
    Removed { algorithm: String },
}

/// Rewrite the manifest text so the entry for `file` matches `contents`.
///
/// Returns the new text and what was done to the entry, or `None` if there
/// is no entry for `file`.
pub fn refresh_text(manifest: &str, file: &str, contents: &[u8]) -> Option<(String, ManifestOutcome)> {
    let mut outcome = None;
    let mut out = String::with_capacity(manifest.len());

    for line in manifest.split_inclusive('\n') {
        let entry = match parse_entry(line) {
            Some(entry) if entry.file == file => entry,
            _ => {
                out.push_str(line);
                continue;
            }
        };

        match DigestAlgorithm::from_manifest_name(entry.algorithm) {
            Some(algorithm) => {
                let ending = &line[line.trim_end().len()..];
                out.push_str(&format!(
                    "{}({})= {}",
                    entry.algorithm,
                    file,
                    compute_digest(algorithm, contents)
                ));
                out.push_str(ending);
                outcome = Some(ManifestOutcome::Updated { algorithm });
            }
            None => {
                outcome = Some(ManifestOutcome::Removed {
                    algorithm: entry.algorithm.to_string(),
                });
            }
        }
    }

    outcome.map(|outcome| (out, outcome))
}

/// Refresh the manifest entry for the descriptor at `descriptor`.
///
/// The manifest is expected at the same path with an `.mf` extension.
pub fn refresh_manifest(descriptor: &Path) -> Result<ManifestOutcome> {
    let manifest_path = descriptor.with_extension("mf");
    if !manifest_path.exists() {
        return Ok(ManifestOutcome::Missing);
    }

    let file = descriptor
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::manifest(format!("invalid descriptor path '{}'", descriptor.display())))?;

    let contents = fs::read(descriptor).map_err(|e| Error::io(e, descriptor))?;
    let manifest = fs::read_to_string(&manifest_path).map_err(|e| Error::io(e, &manifest_path))?;

    let Some((text, outcome)) = refresh_text(&manifest, file, &contents) else {
        warn!(manifest = %manifest_path.display(), file, "manifest has no entry for descriptor");
        return Ok(ManifestOutcome::NoEntry);
    };

    atomic_replace(&manifest_path, text.as_bytes())?;

    match &outcome {
        ManifestOutcome::Updated { algorithm } => {
            info!(manifest = %manifest_path.display(), ?algorithm, "refreshed descriptor digest");
        }
        ManifestOutcome::Removed { algorithm } => {
            warn!(
                manifest = %manifest_path.display(),
                algorithm = %algorithm,
                "unsupported digest algorithm, removed descriptor entry"
            );
        }
        ManifestOutcome::Missing | ManifestOutcome::NoEntry => {}
    }

    Ok(outcome)
}
