//! Locating generated images on disk.

use std::io;
use std::path::{Path, PathBuf};

use crate::history::OutputImage;

/// Absolute path of a reported output image.
pub fn output_path(output_dir: &Path, image: &OutputImage) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    if !image.subfolder.is_empty() {
        path.push(&image.subfolder);
    }
    path.push(&image.filename);
    path
}

/// Newest regular file in `dir` whose name starts with `prefix`.
///
/// Blocking; call through `spawn_blocking` from async code.
pub fn latest_file_with_prefix(dir: &Path, prefix: &str) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(prefix));
        if !matches {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}
