//! Snapshot file I/O
//!
//! File layout: one UTF-8 JSON object, pretty-printed, mapping canonical key
//! strings to arrays of values:
//! ```text
//! {
//!   "[\"en\",3]": [
//!     "first",
//!     "second"
//!   ]
//! }
//! ```

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::Result;

/// Full key→buffer map as stored on disk, ordered by canonical key
pub type Snapshot<V> = BTreeMap<String, Vec<V>>;

/// Snapshot file for a producer identity inside `dir`
///
/// Path separators in `name` are replaced so every identity maps to a file
/// directly inside `dir`.
pub fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    let file_name: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    dir.join(format!("{}.json", file_name))
}

/// Read a snapshot file
///
/// # Returns
/// * `Ok(None)` - the file does not exist
/// * `Ok(Some(snapshot))` - the file was read and parsed
/// * `Err(_)` - the file exists but could not be read or parsed
pub fn read<V: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<V>>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&contents)?))
}

/// Atomically replace the snapshot file with `contents`
///
/// The bytes go to a uniquely named temporary file next to `path`, which is
/// synced and then renamed over the target. Concurrent writers never leave a
/// torn file behind; the last rename wins.
pub fn write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
