//! Namespace / data-store consistency checking.
//!
//! A namespace link must resolve to an existing data file, and every data
//! file must be claimed by exactly one link. [`ConsistencyEngine::check`]
//! reports every violation; nothing is removed until the caller applies one
//! of the functions in [`reconcile`].

mod namespace;
pub mod reconcile;

use ahash::AHashSet;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{default_concurrency, non_overlapping_directories};
use crate::error::{require_dir, Result};
use crate::link;
use crate::progress::ProgressReporter;
use crate::scanner;

pub use namespace::{DuplicateGroup, NamespaceView};
pub use reconcile::{DuplicatePolicy, RemovalOutcome};

/// Kinds of findings, in the order they are usually presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    DarkData,
    Illegal,
    Dangling,
    Duplicate,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::DarkData => "dark data",
            Category::Illegal => "illegal",
            Category::Dangling => "dangling link",
            Category::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsistencyReport {
    /// Data files no namespace link points to.
    pub dark: Vec<PathBuf>,
    pub non_links: Vec<PathBuf>,
    pub dangling: Vec<PathBuf>,
    pub illegal_targets: Vec<PathBuf>,
    pub duplicates: Vec<DuplicateGroup>,
    pub valid_links: usize,
    pub data_files_seen: u64,
    pub unresolved: usize,
    pub scan_errors: usize,
    pub duration: Duration,
}

impl ConsistencyReport {
    /// Namespace-only report: no data stores were scanned.
    pub fn from_views(views: &[NamespaceView]) -> ConsistencyReport {
        let mut report = ConsistencyReport::default();
        for view in views {
            report.non_links.extend(view.non_links.iter().cloned());
            report.dangling.extend(view.dangling.iter().cloned());
            report.illegal_targets.extend(view.illegal_targets.iter().cloned());
            report.duplicates.extend(view.duplicates.iter().cloned());
            report.valid_links += view.valid_link_count();
            report.unresolved += view.unresolved;
            report.scan_errors += view.scan_errors;
        }
        report
    }

    /// Non-link entries plus links to something other than a plain file.
    pub fn illegal_entries(&self) -> Vec<PathBuf> {
        self.non_links
            .iter()
            .chain(self.illegal_targets.iter())
            .cloned()
            .collect()
    }

    /// Removal candidates of one category, in removal order.
    pub fn candidates(&self, category: Category, policy: DuplicatePolicy) -> Vec<PathBuf> {
        match category {
            Category::DarkData => self.dark.clone(),
            Category::Illegal => self.illegal_entries(),
            Category::Dangling => self.dangling.clone(),
            Category::Duplicate => self
                .duplicates
                .iter()
                .flat_map(|group| policy.candidates(group))
                .collect(),
        }
    }

    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::DarkData => self.dark.len(),
            Category::Illegal => self.non_links.len() + self.illegal_targets.len(),
            Category::Dangling => self.dangling.len(),
            Category::Duplicate => self.duplicates.len(),
        }
    }

    pub fn finding_count(&self) -> usize {
        [
            Category::DarkData,
            Category::Illegal,
            Category::Dangling,
            Category::Duplicate,
        ]
        .iter()
        .map(|category| self.count(*category))
        .sum()
    }

    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }
}

/// Checks one or more namespaces against one or more data stores.
pub struct ConsistencyEngine {
    namespaces: Vec<PathBuf>,
    data_roots: Vec<PathBuf>,
    concurrency: usize,
    progress_every: u64,
}

impl ConsistencyEngine {
    /// Every root must be an existing directory; nested data roots are collapsed.
    pub fn new(namespaces: &[PathBuf], data_roots: &[PathBuf]) -> Result<Self> {
        let mut absolute_namespaces = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            require_dir(namespace)?;
            absolute_namespaces.push(link::absolute_root(namespace)?);
        }
        let mut absolute_data = Vec::with_capacity(data_roots.len());
        for data_root in data_roots {
            require_dir(data_root)?;
            absolute_data.push(link::absolute_root(data_root)?);
        }

        Ok(Self {
            namespaces: absolute_namespaces,
            data_roots: non_overlapping_directories(absolute_data),
            concurrency: default_concurrency(),
            progress_every: 1000,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    pub fn data_roots(&self) -> &[PathBuf] {
        &self.data_roots
    }

    pub fn check(&self, reporter: &dyn ProgressReporter) -> Result<ConsistencyReport> {
        let start = Instant::now();

        let views = self
            .namespaces
            .iter()
            .map(|namespace| {
                NamespaceView::collect(namespace, self.concurrency, self.progress_every, reporter)
            })
            .collect::<Result<Vec<_>>>()?;

        // Targets of duplicate groups stay claimed: the group decides their fate.
        let claimed: AHashSet<&Path> = views
            .iter()
            .flat_map(|view| view.targets.keys().map(PathBuf::as_path))
            .collect();
        info!("Found total of {} links", claimed.len());

        let mut report = ConsistencyReport::from_views(&views);
        let dark: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
        let seen_and_errors: Mutex<(u64, usize)> = Mutex::new((0, 0));

        self.data_roots.par_iter().try_for_each(|data_root| {
            let (seen, errors) = self.scan_data_root(data_root, &claimed, &dark, reporter)?;
            let mut totals = seen_and_errors.lock().unwrap_or_else(|e| e.into_inner());
            totals.0 += seen;
            totals.1 += errors;
            Ok::<_, crate::Error>(())
        })?;

        report.dark = dark.into_inner().unwrap_or_else(|e| e.into_inner());
        report.dark.sort();
        let (seen, errors) = seen_and_errors.into_inner().unwrap_or_else(|e| e.into_inner());
        report.data_files_seen = seen;
        report.scan_errors += errors;
        report.duration = start.elapsed();

        info!(
            "{} dark data files, {} illegal entries, {} dangling links, {} duplicate groups",
            report.dark.len(),
            report.count(Category::Illegal),
            report.dangling.len(),
            report.duplicates.len(),
        );
        Ok(report)
    }

    fn scan_data_root(
        &self,
        data_root: &Path,
        claimed: &AHashSet<&Path>,
        dark: &Mutex<Vec<PathBuf>>,
        reporter: &dyn ProgressReporter,
    ) -> Result<(u64, usize)> {
        debug!("Scanning data store {}", data_root.display());
        reporter.on_scan_start(data_root);
        let start = Instant::now();

        let walk = scanner::scan(data_root, self.concurrency)?;
        let errors = walk.errors();
        let mut seen: u64 = 0;
        for listing in walk {
            let unclaimed: Vec<PathBuf> = listing
                .files
                .into_iter()
                .chain(listing.links)
                .inspect(|path| {
                    seen += 1;
                    if self.progress_every > 0 && seen % self.progress_every == 0 {
                        reporter.on_scan_progress(seen, path);
                    }
                })
                .filter(|path| !claimed.contains(path.as_path()))
                .collect();
            if !unclaimed.is_empty() {
                dark.lock().unwrap_or_else(|e| e.into_inner()).extend(unclaimed);
            }
        }

        reporter.on_scan_complete(seen, start.elapsed().as_secs_f64());
        Ok((seen, errors.try_iter().count()))
    }
}
