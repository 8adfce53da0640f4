//! Migration of link + data file pairs to a new namespace and data store.
//!
//! The source namespace is walked once; every valid link whose file lives
//! under the source data root becomes a [`MigrationUnit`] handed to a
//! bounded pool of workers. A worker copies the file, recreates the link on
//! the destination and only then removes the source link and file, in that
//! order. Failed units keep their source and are listed in the report.

mod pacing;
mod unit;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::default_concurrency;
use crate::consistency::reconcile::{remove_entry, remove_paths, RemovalOutcome};
use crate::decision::{resolve_findings, Decider};
use crate::error::{require_dir, Error, Result};
use crate::link::{self, ResolvedLink};
use crate::progress::ProgressReporter;
use crate::scanner;
use crate::transport::{new_run_id, ConnectionId, OwnerGroup, Transport};

pub use pacing::Pacer;
pub use unit::{
    ancestors_below, plan_unit, FailureStage, MigrationUnit, PathMapping, UnitPlan, UnitState,
};

#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub source_namespace: PathBuf,
    pub source_data: PathBuf,
    /// Further restricts which files below `source_data` are moved.
    pub source_pattern: Option<glob::Pattern>,
    pub destination_namespace: PathBuf,
    pub destination_data: PathBuf,
    pub owner: OwnerGroup,
    pub threads: usize,
    pub pacing_cap: Duration,
    pub progress_every: u64,
}

impl DrainConfig {
    pub fn new(
        source_namespace: &Path,
        source_data: &Path,
        destination_namespace: &Path,
        destination_data: &Path,
        owner: OwnerGroup,
    ) -> Self {
        Self {
            source_namespace: source_namespace.to_path_buf(),
            source_data: source_data.to_path_buf(),
            source_pattern: None,
            destination_namespace: destination_namespace.to_path_buf(),
            destination_data: destination_data.to_path_buf(),
            owner,
            threads: default_concurrency(),
            pacing_cap: Duration::from_secs(10),
            progress_every: 1000,
        }
    }

    pub fn with_source_pattern(mut self, pattern: &str) -> Result<Self> {
        let compiled = glob::Pattern::new(pattern).map_err(|err| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
        self.source_pattern = Some(compiled);
        Ok(self)
    }
}

/// A unit that did not complete, with the step it failed at.
#[derive(Debug, Clone)]
pub struct FailedUnit {
    pub seq: u64,
    pub source_link: PathBuf,
    pub source_file: PathBuf,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub run_id: String,
    pub discovered: u64,
    pub migrated: u64,
    pub failed: Vec<FailedUnit>,
    /// Source links whose file was already gone; removed, not migrated.
    pub dangling_removed: usize,
    /// Namespace entries that are not links, or links to non-files.
    pub illegal_entries: Vec<PathBuf>,
    /// Valid links pointing outside the source data root or pattern.
    pub skipped_links: usize,
    pub unreadable_links: usize,
    pub scan_errors: usize,
    pub interrupted: bool,
    pub duration: Duration,
}

impl DrainReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

/// Result of [`Drainer::tidy_source`].
#[derive(Debug, Default)]
pub struct SourceTidy {
    pub illegal: RemovalOutcome,
    pub pruned_dirs: usize,
}

struct UnitFailure {
    stage: FailureStage,
    reason: String,
}

impl UnitFailure {
    fn new(stage: FailureStage, reason: impl ToString) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Everything the workers share for one run.
struct RunContext<'a> {
    pacer: Pacer,
    namespace: PathMapping,
    data: PathMapping,
    report: Mutex<DrainReport>,
    reporter: &'a dyn ProgressReporter,
}

pub struct Drainer {
    config: DrainConfig,
    transport: Arc<dyn Transport>,
    run_id: String,
    shutdown: Arc<AtomicBool>,
}

impl Drainer {
    /// Roots are made absolute; nothing is touched until [`Drainer::run`].
    /// Remote destination roots cannot be resolved here and are only
    /// normalised, see [`Drainer::check_preconditions`].
    pub fn new(mut config: DrainConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.source_namespace = link::absolute_root(&config.source_namespace)?;
        config.source_data = link::absolute_root(&config.source_data)?;
        if transport.is_local() {
            config.destination_namespace = link::absolute_root(&config.destination_namespace)?;
            config.destination_data = link::absolute_root(&config.destination_data)?;
        } else {
            config.destination_namespace = link::normalize_lexically(&config.destination_namespace);
            config.destination_data = link::normalize_lexically(&config.destination_data);
        }
        config.threads = config.threads.max(1);
        let run_id = new_run_id(&config.source_data);
        Ok(Self {
            config,
            transport,
            run_id,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the flag stops admission of new units; queued ones still run.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Source roots exist and both destination roots are absolute and accept
    /// files owned by the configured owner.
    pub fn check_preconditions(&self) -> Result<()> {
        require_dir(&self.config.source_namespace)?;
        require_dir(&self.config.source_data)?;

        for dir in [&self.config.destination_namespace, &self.config.destination_data] {
            if !dir.is_absolute() {
                return Err(Error::RelativeDestination(dir.clone()));
            }
        }

        if self.transport.is_local() && self.config.destination_data == self.config.source_data {
            return Err(Error::Other(format!(
                "destination data store {} is the source data store",
                self.config.destination_data.display()
            )));
        }

        let conn = ConnectionId::new(&self.run_id, 0);
        for dir in [&self.config.destination_namespace, &self.config.destination_data] {
            info!("Testing write access to {}", dir.display());
            self.transport
                .make_dirs(&conn, &[dir.as_path()])
                .and_then(|()| self.transport.probe_writable(&conn, dir, &self.config.owner))
                .map_err(|source| Error::DestinationNotWritable {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<DrainReport> {
        let start = Instant::now();
        let threads = self.config.threads;
        info!(
            "Draining {} ({}) with {} workers, run {}",
            self.config.source_namespace.display(),
            self.config.source_data.display(),
            threads,
            self.run_id
        );

        let ctx = RunContext {
            pacer: Pacer::new(threads, self.config.pacing_cap),
            namespace: PathMapping::new(
                &self.config.source_namespace,
                &self.config.destination_namespace,
            ),
            data: PathMapping::new(&self.config.source_data, &self.config.destination_data),
            report: Mutex::new(DrainReport {
                run_id: self.run_id.clone(),
                ..DrainReport::default()
            }),
            reporter,
        };

        thread::scope(|scope| -> Result<()> {
            let (sender, receiver) = bounded::<MigrationUnit>(threads);
            for worker in 0..threads {
                let receiver = receiver.clone();
                let ctx = &ctx;
                thread::Builder::new()
                    .name(format!("drain-{}", worker))
                    .spawn_scoped(scope, move || self.worker_loop(worker, receiver, ctx))?;
            }
            drop(receiver);
            self.produce(&sender, &ctx)
        })?;

        let mut report = ctx.report.into_inner().unwrap_or_else(|e| e.into_inner());
        report.failed.sort_by_key(|failed| failed.seq);
        report.duration = start.elapsed();
        info!(
            "Migrated {} of {} units, {} failed, {} dangling links removed",
            report.migrated,
            report.discovered,
            report.failed.len(),
            report.dangling_removed
        );
        Ok(report)
    }

    /// Offers the illegal entries left in the source namespace for removal,
    /// then removes the empty directories the run left behind in both
    /// source roots.
    pub fn tidy_source<D, L>(
        &self,
        decider: &mut D,
        illegal_entries: &[PathBuf],
        on_list: L,
    ) -> Result<SourceTidy>
    where
        D: Decider + ?Sized,
        L: FnMut(),
    {
        let mut tidy = SourceTidy::default();
        resolve_findings(
            decider,
            "illegal",
            illegal_entries.len(),
            on_list,
            || tidy.illegal = remove_paths(illegal_entries),
        );

        for root in [&self.config.source_data, &self.config.source_namespace] {
            let pruned = scanner::prune_empty_dirs(root, self.config.threads)?;
            info!("Removed {} empty directories below {}", pruned, root.display());
            tidy.pruned_dirs += pruned;
        }
        Ok(tidy)
    }

    fn wants(&self, target: &Path) -> bool {
        target.starts_with(&self.config.source_data)
            && self
                .config
                .source_pattern
                .as_ref()
                .map_or(true, |pattern| pattern.matches_path(target))
    }

    /// Walks the source namespace and queues units. Returns once the walk is
    /// exhausted or the shutdown flag is raised.
    fn produce(&self, sender: &Sender<MigrationUnit>, ctx: &RunContext<'_>) -> Result<()> {
        let walk = scanner::scan(&self.config.source_namespace, self.config.threads)?;
        let errors = walk.errors();

        let mut seq: u64 = 0;
        let mut seen: u64 = 0;
        let mut dangling_removed = 0;
        let mut illegal = Vec::new();
        let mut skipped = 0;
        let mut unreadable = 0;
        let mut interrupted = false;

        'walk: for listing in walk {
            illegal.extend(listing.files);
            for link_path in listing.links {
                if self.shutdown.load(Ordering::SeqCst) {
                    warn!("Interrupted, no further units are admitted");
                    interrupted = true;
                    break 'walk;
                }
                seen += 1;
                if self.config.progress_every > 0 && seen % self.config.progress_every == 0 {
                    ctx.reporter.on_scan_progress(seen, &link_path);
                }

                match link::resolve_link(&link_path) {
                    Ok(ResolvedLink::Valid(target)) if self.wants(&target) => {
                        let mut unit = MigrationUnit::new(seq, link_path, target);
                        seq += 1;
                        unit.advance(UnitState::Queued);
                        if sender.send(unit).is_err() {
                            break 'walk;
                        }
                    }
                    Ok(ResolvedLink::Valid(_)) => skipped += 1,
                    Ok(ResolvedLink::Dangling(target)) if self.wants(&target) => {
                        match remove_entry(&link_path) {
                            Ok(_) => {
                                debug!("Removed dangling link {}", link_path.display());
                                dangling_removed += 1;
                            }
                            Err(err) => {
                                warn!("Failed to remove dangling link {}: {}", link_path.display(), err)
                            }
                        }
                    }
                    Ok(ResolvedLink::Dangling(_)) => skipped += 1,
                    Ok(ResolvedLink::IllegalTarget(_)) => illegal.push(link_path),
                    Err(err) => {
                        warn!("Cannot resolve {}: {}", link_path.display(), err);
                        unreadable += 1;
                    }
                }
            }
        }

        let mut report = ctx.report.lock().unwrap_or_else(|e| e.into_inner());
        report.discovered = seq;
        report.dangling_removed = dangling_removed;
        report.illegal_entries = illegal;
        report.skipped_links = skipped;
        report.unreadable_links = unreadable;
        report.scan_errors = errors.try_iter().count();
        report.interrupted = interrupted;
        Ok(())
    }

    fn worker_loop(&self, worker: usize, units: Receiver<MigrationUnit>, ctx: &RunContext<'_>) {
        let conn = ConnectionId::new(&self.run_id, worker);
        for mut unit in units.iter() {
            ctx.reporter.on_unit_start(unit.seq, &unit.source_link);

            let delay = ctx.pacer.delay_for(unit.seq);
            if !delay.is_zero() && !self.shutdown.load(Ordering::SeqCst) {
                thread::sleep(delay);
            }

            match self.migrate(&conn, &mut unit, ctx) {
                Ok(()) => {
                    ctx.report.lock().unwrap_or_else(|e| e.into_inner()).migrated += 1;
                    ctx.reporter.on_unit_done(unit.seq, &unit.source_link);
                }
                Err(failure) => {
                    error!(
                        "Unit {} ({}) failed at {}: {}",
                        unit.seq,
                        unit.source_link.display(),
                        failure.stage,
                        failure.reason
                    );
                    ctx.reporter
                        .on_unit_failed(unit.seq, &unit.source_link, &failure.reason);
                    ctx.report
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .failed
                        .push(FailedUnit {
                            seq: unit.seq,
                            source_link: unit.source_link,
                            source_file: unit.source_file,
                            stage: failure.stage,
                            reason: failure.reason,
                        });
                }
            }
        }
        self.transport.close(&conn);
    }

    fn migrate(
        &self,
        conn: &ConnectionId,
        unit: &mut MigrationUnit,
        ctx: &RunContext<'_>,
    ) -> std::result::Result<(), UnitFailure> {
        let result = self.migrate_steps(conn, unit, ctx);
        if let Err(failure) = &result {
            unit.fail(failure.stage);
        }
        result
    }

    fn migrate_steps(
        &self,
        conn: &ConnectionId,
        unit: &mut MigrationUnit,
        ctx: &RunContext<'_>,
    ) -> std::result::Result<(), UnitFailure> {
        let plan = plan_unit(unit, &ctx.namespace, &ctx.data).ok_or_else(|| {
            UnitFailure::new(FailureStage::Plan, "paths are not below the source roots")
        })?;
        unit.advance(UnitState::Transferring);

        let parents: Vec<&Path> = [plan.dest_link.parent(), plan.dest_file.parent()]
            .into_iter()
            .flatten()
            .collect();
        self.transport
            .make_dirs(conn, &parents)
            .map_err(|err| UnitFailure::new(FailureStage::CreateDirs, err))?;
        self.transport
            .copy_file(conn, &unit.source_file, &plan.dest_file)
            .map_err(|err| UnitFailure::new(FailureStage::Transfer, err))?;

        let mut also_chown = plan.new_dirs.clone();
        also_chown.push(plan.dest_file.clone());
        if let Err(err) = self.transport.link_and_chown(
            conn,
            &plan.dest_file,
            &plan.dest_link,
            &self.config.owner,
            &also_chown,
        ) {
            warn!(
                "{} was transferred but is not linked from {}",
                plan.dest_file.display(),
                plan.dest_link.display()
            );
            return Err(UnitFailure::new(FailureStage::Link, err));
        }
        unit.advance(UnitState::Linked);

        // link first: an interruption here leaves a dangling link, never an
        // unreferenced file
        if plan.dest_link != unit.source_link {
            remove_entry(&unit.source_link)
                .map_err(|err| UnitFailure::new(FailureStage::SourceClear, err))?;
        }
        if plan.dest_file != unit.source_file {
            remove_entry(&unit.source_file)
                .map_err(|err| UnitFailure::new(FailureStage::SourceClear, err))?;
        }
        unit.advance(UnitState::SourceCleared);
        unit.advance(UnitState::Done);
        Ok(())
    }
}
