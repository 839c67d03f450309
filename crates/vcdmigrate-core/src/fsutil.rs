//! Atomic file replacement.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` returns `Some("")` for bare relative file names.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Replace `dest` with `contents`.
///
/// The data is written to a temp file in the same directory, synced, and
/// renamed over `dest`. If anything fails before the rename, `dest` is left
/// untouched and the temp file is removed.
pub fn atomic_replace(dest: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir_or_dot(dest);

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir))?;
    tmp.write_all(contents)
        .map_err(|e| Error::io(e, tmp.path()))?;
    tmp.flush().map_err(|e| Error::io(e, tmp.path()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(e, tmp.path()))?;

    tmp.persist(dest).map_err(|e| Error::io(e.error, dest))?;

    // Best-effort: the file is already in place.
    let _ = File::open(dir).and_then(|d| d.sync_all());

    Ok(())
}
