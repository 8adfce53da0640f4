use std::fmt;
use std::path::{Path, PathBuf};

use crate::link::normalize_lexically;

/// Step at which a unit gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Destination paths could not be computed.
    Plan,
    CreateDirs,
    Transfer,
    Link,
    SourceClear,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Plan => "plan",
            FailureStage::CreateDirs => "create directories",
            FailureStage::Transfer => "transfer",
            FailureStage::Link => "link",
            FailureStage::SourceClear => "source clear",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Discovered,
    Queued,
    Transferring,
    Linked,
    SourceCleared,
    Done,
    Failed(FailureStage),
}

/// One link and the data file behind it, moved as a pair.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    pub seq: u64,
    pub source_link: PathBuf,
    pub source_file: PathBuf,
    pub state: UnitState,
}

impl MigrationUnit {
    pub fn new(seq: u64, source_link: PathBuf, source_file: PathBuf) -> Self {
        Self {
            seq,
            source_link,
            source_file,
            state: UnitState::Discovered,
        }
    }

    pub fn advance(&mut self, next: UnitState) {
        tracing::debug!(
            "Unit {} {}: {:?} -> {:?}",
            self.seq,
            self.source_link.display(),
            self.state,
            next
        );
        self.state = next;
    }

    pub fn fail(&mut self, stage: FailureStage) {
        self.advance(UnitState::Failed(stage));
    }
}

/// Where a unit ends up on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPlan {
    pub dest_link: PathBuf,
    pub dest_file: PathBuf,
    /// Directories to create, outermost first, stopping below the destination roots.
    pub new_dirs: Vec<PathBuf>,
}

/// Replaces a source root prefix with a destination root prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
}

impl PathMapping {
    pub fn new(source_root: &Path, dest_root: &Path) -> Self {
        Self {
            source_root: normalize_lexically(source_root),
            dest_root: normalize_lexically(dest_root),
        }
    }

    /// `None` when `path` is not below the source root.
    pub fn map(&self, path: &Path) -> Option<PathBuf> {
        let rest = path.strip_prefix(&self.source_root).ok()?;
        Some(normalize_lexically(&self.dest_root.join(rest)))
    }
}

/// Ancestors of `path` strictly below `stop`, outermost first.
pub fn ancestors_below(path: &Path, stop: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = path
        .ancestors()
        .skip(1)
        .take_while(|dir| *dir != stop && dir.starts_with(stop))
        .map(Path::to_path_buf)
        .collect();
    dirs.reverse();
    dirs
}

/// Destination link and file for a unit, plus the directories leading to them.
pub fn plan_unit(
    unit: &MigrationUnit,
    namespace: &PathMapping,
    data: &PathMapping,
) -> Option<UnitPlan> {
    let dest_link = namespace.map(&unit.source_link)?;
    let dest_file = data.map(&unit.source_file)?;
    let mut new_dirs = ancestors_below(&dest_link, &namespace.dest_root);
    new_dirs.extend(ancestors_below(&dest_file, &data.dest_root));
    Some(UnitPlan {
        dest_link,
        dest_file,
        new_dirs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_replaces_prefix() {
        let mapping = PathMapping::new(Path::new("/data/xrd"), Path::new("/srv//new/"));
        assert_eq!(
            mapping.map(Path::new("/data/xrd/01/ab/file")),
            Some(PathBuf::from("/srv/new/01/ab/file"))
        );
        assert_eq!(mapping.map(Path::new("/data/xrd10/file")), None);
    }

    #[test]
    fn test_ancestors_below() {
        assert_eq!(
            ancestors_below(Path::new("/dst/ns/a/b/link"), Path::new("/dst/ns")),
            vec![PathBuf::from("/dst/ns/a"), PathBuf::from("/dst/ns/a/b")]
        );
        assert!(ancestors_below(Path::new("/dst/ns/link"), Path::new("/dst/ns")).is_empty());
    }

    #[test]
    fn test_plan_unit() {
        let unit = MigrationUnit::new(
            0,
            PathBuf::from("/ns/store/a/f"),
            PathBuf::from("/data/01/f"),
        );
        let namespace = PathMapping::new(Path::new("/ns/store"), Path::new("/new/ns"));
        let data = PathMapping::new(Path::new("/data"), Path::new("/new/data"));
        let plan = plan_unit(&unit, &namespace, &data).unwrap();
        assert_eq!(plan.dest_link, PathBuf::from("/new/ns/a/f"));
        assert_eq!(plan.dest_file, PathBuf::from("/new/data/01/f"));
        assert_eq!(
            plan.new_dirs,
            vec![PathBuf::from("/new/ns/a"), PathBuf::from("/new/data/01")]
        );
    }

    #[test]
    fn test_unit_state_transitions() {
        let mut unit = MigrationUnit::new(3, PathBuf::from("/ns/l"), PathBuf::from("/d/f"));
        assert_eq!(unit.state, UnitState::Discovered);
        unit.advance(UnitState::Queued);
        unit.fail(FailureStage::Transfer);
        assert_eq!(unit.state, UnitState::Failed(FailureStage::Transfer));
        unit.advance(UnitState::Done);
        assert_eq!(unit.state, UnitState::Done);
    }
}
