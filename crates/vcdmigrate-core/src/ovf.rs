//! OVF descriptor flattening.
//!
//! When `ovftool` exports a vApp template it wraps the VM in an
//! `ovf:VirtualSystemCollection`, even if the vApp holds a single VM. The
//! Compute Engine importer expects the `ovf:VirtualSystem` directly under the
//! `ovf:Envelope`, so the wrapper has to go.
//!
//! The rewrite works on the descriptor as text, line by line, so everything
//! that is kept stays byte-for-byte identical.

use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fsutil::atomic_replace;

const COLLECTION_OPEN: &str = "<ovf:VirtualSystemCollection ";
const COLLECTION_CLOSE: &str = "</ovf:VirtualSystemCollection>";
const SYSTEM_OPEN: &str = "<ovf:VirtualSystem ";
const ENVELOPE_CLOSE: &str = "</ovf:Envelope>";

/// How strictly to treat the descriptor while flattening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlattenMode {
    /// Stream lines through the wrapper filter without further checks.
    Permissive,
    /// Require exactly one wrapped system and a well-formed result.
    #[default]
    Strict,
}

/// Result of flattening a descriptor file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenOutcome {
    /// The wrapper was removed; `removed_lines` lines were dropped.
    Flattened { removed_lines: usize },
    /// No wrapper was found; the file was not touched.
    Unchanged,
}

/// Streaming line filter that drops the collection wrapper.
#[derive(Debug, Default)]
struct Flattener {
    skip: bool,
}

impl Flattener {
    /// Update the state for `line` and report whether it should be kept.
    fn keep(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.starts_with(COLLECTION_OPEN) || trimmed.starts_with(COLLECTION_CLOSE) {
            self.skip = true;
        } else if trimmed.starts_with(SYSTEM_OPEN) || trimmed.starts_with(ENVELOPE_CLOSE) {
            self.skip = false;
        }
        !self.skip
    }
}

/// Drop the `VirtualSystemCollection` wrapper from a sequence of lines.
///
/// The wrapper's own tags are dropped, as is anything between the wrapper's
/// opening tag and the inner `VirtualSystem`. Everything from the inner
/// system through the envelope's closing tag is kept. Input without a
/// wrapper passes through unchanged.
pub fn flatten_lines<I, S>(lines: I) -> Vec<S>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut flattener = Flattener::default();
    lines
        .into_iter()
        .filter(|line| flattener.keep(line.as_ref()))
        .collect()
}

/// Flatten descriptor text, preserving line endings.
pub fn flatten_str(text: &str) -> String {
    flatten_lines(text.split_inclusive('\n')).concat()
}

/// Whether the descriptor text contains a collection wrapper.
pub fn has_collection(text: &str) -> bool {
    text.lines().any(|line| {
        let trimmed = line.trim();
        trimmed.starts_with(COLLECTION_OPEN) || trimmed.starts_with(COLLECTION_CLOSE)
    })
}

/// Check that the wrapper tags appear in the order the filter relies on.
///
/// Exactly one wrapper, opened before it is closed, holding exactly one
/// `VirtualSystem`.
pub fn check_collection_structure(text: &str) -> Result<()> {
    let mut opened = false;
    let mut closed = false;
    let mut systems = 0usize;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.starts_with(COLLECTION_OPEN) {
            if opened {
                return Err(Error::ovf(format!(
                    "line {line_no}: more than one VirtualSystemCollection"
                )));
            }
            opened = true;
        } else if trimmed.starts_with(COLLECTION_CLOSE) {
            if closed {
                return Err(Error::ovf(format!(
                    "line {line_no}: VirtualSystemCollection closed more than once"
                )));
            }
            if !opened {
                return Err(Error::ovf(format!(
                    "line {line_no}: VirtualSystemCollection closed without being opened"
                )));
            }
            if systems != 1 {
                return Err(Error::ovf(format!(
                    "VirtualSystemCollection holds {systems} VirtualSystem elements, expected exactly 1"
                )));
            }
            closed = true;
        } else if trimmed.starts_with(SYSTEM_OPEN) && opened && !closed {
            systems += 1;
        }
    }

    if opened && !closed {
        return Err(Error::ovf("VirtualSystemCollection is never closed"));
    }
    Ok(())
}

/// Check that flattened text is well-formed XML with a single
/// `VirtualSystem` directly under the `Envelope`.
pub fn verify_flattened(text: &str) -> Result<()> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut saw_root = false;
    let mut systems = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::ovf(format!("flattened descriptor is not well-formed: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if depth == 0 {
                    if saw_root || name != b"Envelope" {
                        return Err(Error::ovf("descriptor root element is not a single Envelope"));
                    }
                    saw_root = true;
                } else if name == b"VirtualSystemCollection" {
                    return Err(Error::ovf("flattened descriptor still has a VirtualSystemCollection"));
                } else if depth == 1 && name == b"VirtualSystem" {
                    systems += 1;
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::ovf("descriptor has no Envelope element"));
    }
    if systems != 1 {
        return Err(Error::ovf(format!(
            "flattened descriptor has {systems} VirtualSystem elements under Envelope, expected exactly 1"
        )));
    }
    Ok(())
}

/// Remove the collection wrapper from the descriptor at `path`.
///
/// The new content is written to a temp file next to `path` and renamed over
/// it once complete, so `path` always holds either the original or the
/// fully flattened descriptor.
pub fn flatten_descriptor(path: &Path, mode: FlattenMode) -> Result<FlattenOutcome> {
    let original = fs::read_to_string(path).map_err(|e| Error::io(e, path))?;

    if !has_collection(&original) {
        debug!(path = %path.display(), "descriptor has no VirtualSystemCollection");
        return Ok(FlattenOutcome::Unchanged);
    }

    if mode == FlattenMode::Strict {
        check_collection_structure(&original)?;
    }

    let flattened = flatten_str(&original);

    if mode == FlattenMode::Strict {
        verify_flattened(&flattened)?;
    }

    atomic_replace(path, flattened.as_bytes())?;

    let removed_lines = original.lines().count() - flattened.lines().count();
    info!(path = %path.display(), removed_lines, "removed VirtualSystemCollection");
    Ok(FlattenOutcome::Flattened { removed_lines })
}
