//! Concurrent directory walker.
//!
//! [`scan`] returns a lazy [`Walk`] that yields one [`DirListing`] per visited
//! directory. Unreadable subtrees are skipped and reported on the walk's error
//! channel, never aborting the scan.

mod walk;

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use walk::{scan, Walk};

/// Children of a single directory, split by kind (directory, file, link).
/// Paths are full paths.
#[derive(Debug, Clone, Default)]
pub struct DirListing {
    pub path: PathBuf,
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub links: Vec<PathBuf>,
}

#[derive(Error, Debug)]
#[error("Error reading directory {}: {source}", .path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Removes every empty directory strictly below `root`, deepest first.
///
/// Directories that still hold entries are left alone. Returns the number of
/// directories removed.
pub fn prune_empty_dirs(root: &Path, concurrency: usize) -> crate::Result<usize> {
    let mut dirs: Vec<PathBuf> = scan(root, concurrency)?
        .flat_map(|listing| listing.dirs)
        .collect();
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    let mut removed = 0;
    for dir in dirs {
        match std::fs::remove_dir(&dir) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            // not empty, or otherwise not ours to remove
            Err(_) => {}
        }
    }
    tracing::debug!("Pruned {} empty directories below {}", removed, root.display());
    Ok(removed)
}
