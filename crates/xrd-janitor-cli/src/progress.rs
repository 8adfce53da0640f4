use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use xrd_janitor_core::ProgressReporter;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICKS),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// CLI progress reporter using indicatif spinners.
///
/// - Scans: one spinner per root, counting entries
/// - Drain: one spinner counting done and failed units
/// - Removal: a bar over the entries of one server
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    done: AtomicU64,
    failed: AtomicU64,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            done: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    pub fn finish(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }

    fn update_units(&self) {
        let message = format!(
            "Migrating... {} done, {} failed",
            self.done.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed)
        );
        let mut guard = self.guard();
        match guard.as_ref() {
            Some(pb) => pb.set_message(message),
            None => *guard = Some(spinner(message)),
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root: &Path) {
        self.set_bar(spinner(format!("Scanning {}...", root.display())));
    }

    fn on_scan_progress(&self, entries_seen: u64, current_path: &Path) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_message(format!(
                "Scanning... {} entries ({})",
                entries_seen,
                current_path.display()
            ));
        }
    }

    fn on_scan_complete(&self, entries_seen: u64, duration_secs: f64) {
        self.finish();
        eprintln!(
            "  {} Scan complete: {} entries in {:.2}s",
            "✓".green(),
            entries_seen,
            duration_secs
        );
    }

    fn on_unit_done(&self, _seq: u64, _source_link: &Path) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.update_units();
    }

    fn on_unit_failed(&self, _seq: u64, source_link: &Path, reason: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let guard = self.guard();
        let line = format!("  {} {}: {}", "✗".red(), source_link.display(), reason);
        match guard.as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
        drop(guard);
        self.update_units();
    }

    fn on_merge_progress(&self, keys_compared: u64) {
        let mut guard = self.guard();
        let message = format!("Merging... {} entries compared", keys_compared);
        match guard.as_ref() {
            Some(pb) => pb.set_message(message),
            None => *guard = Some(spinner(message)),
        }
    }

    fn on_removal(&self, removed: usize, total: usize) {
        let mut guard = self.guard();
        if guard.as_ref().map_or(true, |pb| pb.length() != Some(total as u64)) {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "  {spinner:.cyan} Removing [{bar:30.cyan/dim}] {pos}/{len} entries",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─")
                .tick_chars(TICKS),
            );
            *guard = Some(pb);
        }
        if let Some(pb) = guard.as_ref() {
            pb.set_position(removed as u64);
            if removed >= total {
                pb.finish_and_clear();
                *guard = None;
            }
        }
    }
}
