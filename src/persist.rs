//! Atomic file replacement and lenient reads for persisted files.

use crate::error::{Result, VersioningError};
use serde::Serialize;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

/// Read a file, treating a missing or blank file as absent.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VersioningError::io(path, e)),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    replace_atomic(path, &bytes)
}

/// Atomically replace `path` with `content`.
pub(crate) fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    replace_atomic(path, content.as_bytes())
}

/// Write through a temp file in the target directory, then rename over `path`.
fn replace_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| VersioningError::io(dir, e))?;

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| VersioningError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| VersioningError::io(tmp.path(), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| VersioningError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| VersioningError::io(path, e.error))?;
    Ok(())
}
