use std::path::Path;

/// Trait for reporting progress of long scans, merges and transfers.
///
/// CLI implements with tracing/indicatif, tests use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &Path) {}
    fn on_scan_progress(&self, _entries_seen: u64, _current_path: &Path) {}
    fn on_scan_complete(&self, _entries_seen: u64, _duration_secs: f64) {}
    fn on_unit_start(&self, _seq: u64, _source_link: &Path) {}
    fn on_unit_done(&self, _seq: u64, _source_link: &Path) {}
    fn on_unit_failed(&self, _seq: u64, _source_link: &Path, _reason: &str) {}
    fn on_merge_progress(&self, _keys_compared: u64) {}
    fn on_removal(&self, _removed: usize, _total: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
