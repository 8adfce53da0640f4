use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::DuplicateGroup;

/// What to do with a duplicate-link group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Remove every link of the group and the shared data file.
    #[default]
    DeleteGroup,
    /// Keep the first discovered link and its data file, remove the others.
    KeepFirst,
}

impl DuplicatePolicy {
    /// Paths to delete for `group`, links always before the data file.
    pub fn candidates(&self, group: &DuplicateGroup) -> Vec<PathBuf> {
        match self {
            DuplicatePolicy::DeleteGroup => {
                let mut paths = group.links.clone();
                paths.push(group.target.clone());
                paths
            }
            DuplicatePolicy::KeepFirst => group.links.iter().skip(1).cloned().collect(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RemovalOutcome {
    pub removed: usize,
    /// Candidates that had already disappeared; counted as satisfied.
    pub already_gone: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl RemovalOutcome {
    pub fn merge(&mut self, other: RemovalOutcome) {
        self.removed += other.removed;
        self.already_gone += other.already_gone;
        self.failed.extend(other.failed);
    }
}

/// Removes a single file or link, treating a missing path as success.
/// Returns `Ok(false)` when the path was already gone.
pub fn remove_entry(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Removes every path in order.
pub fn remove_paths(paths: &[PathBuf]) -> RemovalOutcome {
    let mut outcome = RemovalOutcome::default();
    for path in paths {
        match remove_entry(path) {
            Ok(true) => {
                debug!("Removed {}", path.display());
                outcome.removed += 1;
            }
            Ok(false) => outcome.already_gone += 1,
            Err(err) => {
                error!("Failed to remove '{}': {}", path.display(), err);
                outcome.failed.push((path.clone(), err.to_string()));
            }
        }
    }
    outcome
}

/// Applies `policy` to every group.
pub fn remove_duplicate_groups(groups: &[DuplicateGroup], policy: DuplicatePolicy) -> RemovalOutcome {
    let mut outcome = RemovalOutcome::default();
    for group in groups {
        outcome.merge(remove_paths(&policy.candidates(group)));
    }
    info!(
        "Duplicate groups resolved: {} removed, {} already gone, {} failed",
        outcome.removed,
        outcome.already_gone,
        outcome.failed.len()
    );
    outcome
}
