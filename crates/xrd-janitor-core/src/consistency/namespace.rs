use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{require_dir, Result};
use crate::link::{self, ResolvedLink};
use crate::progress::ProgressReporter;
use crate::scanner;

/// A data-store target pointed to by more than one link of one namespace.
///
/// `links[0]` is the first link discovered during the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub target: PathBuf,
    pub links: Vec<PathBuf>,
}

/// Everything one scan pass learns about a namespace root.
#[derive(Debug, Default)]
pub struct NamespaceView {
    pub root: PathBuf,
    /// Valid link target -> first link that claimed it.
    pub targets: AHashMap<PathBuf, PathBuf>,
    pub duplicates: Vec<DuplicateGroup>,
    /// Namespace entries that are not links at all.
    pub non_links: Vec<PathBuf>,
    pub dangling: Vec<PathBuf>,
    /// Links whose target exists but is not a plain file.
    pub illegal_targets: Vec<PathBuf>,
    /// Links that could not be read or resolved; left untouched.
    pub unresolved: usize,
    pub scan_errors: usize,
}

impl NamespaceView {
    /// Scans `root` once, classifying every entry.
    pub fn collect(
        root: &Path,
        concurrency: usize,
        progress_every: u64,
        reporter: &dyn ProgressReporter,
    ) -> Result<NamespaceView> {
        require_dir(root)?;
        let root = link::absolute_root(root)?;
        info!("Collecting all link targets in {}", root.display());
        reporter.on_scan_start(&root);
        let start = Instant::now();

        let mut view = NamespaceView {
            root: root.clone(),
            ..NamespaceView::default()
        };
        let mut duplicate_index: AHashMap<PathBuf, usize> = AHashMap::new();
        let mut seen: u64 = 0;

        let walk = scanner::scan(&root, concurrency)?;
        let errors = walk.errors();
        for listing in walk {
            for path in listing.files {
                seen += 1;
                view.non_links.push(path);
            }
            for path in listing.links {
                seen += 1;
                if progress_every > 0 && seen % progress_every == 0 {
                    reporter.on_scan_progress(seen, &path);
                }
                match link::resolve_link(&path) {
                    Ok(ResolvedLink::Valid(target)) => {
                        view.accept(path, target, &mut duplicate_index)
                    }
                    Ok(ResolvedLink::Dangling(_)) => view.dangling.push(path),
                    Ok(ResolvedLink::IllegalTarget(_)) => view.illegal_targets.push(path),
                    Err(err) => {
                        warn!("Cannot resolve link {}: {}", path.display(), err);
                        view.unresolved += 1;
                    }
                }
            }
        }
        view.scan_errors = errors.try_iter().count();

        reporter.on_scan_complete(seen, start.elapsed().as_secs_f64());
        debug!(
            "{}: {} valid targets, {} duplicate groups, {} non-links, {} dangling, {} illegal targets",
            root.display(),
            view.targets.len(),
            view.duplicates.len(),
            view.non_links.len(),
            view.dangling.len(),
            view.illegal_targets.len(),
        );
        Ok(view)
    }

    /// Records a valid link. A second link to an already claimed target opens
    /// a duplicate group holding both; later ones join that group.
    fn accept(
        &mut self,
        link: PathBuf,
        target: PathBuf,
        duplicate_index: &mut AHashMap<PathBuf, usize>,
    ) {
        if let Some(&group) = duplicate_index.get(&target) {
            self.duplicates[group].links.push(link);
            return;
        }
        match self.targets.get(&target) {
            Some(first) => {
                duplicate_index.insert(target.clone(), self.duplicates.len());
                self.duplicates.push(DuplicateGroup {
                    links: vec![first.clone(), link],
                    target,
                });
            }
            None => {
                self.targets.insert(target, link);
            }
        }
    }

    pub fn valid_link_count(&self) -> usize {
        self.targets.len()
    }
}
