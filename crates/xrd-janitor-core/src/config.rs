use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ssh_path: String,
    pub rsync_path: String,
    pub default_user: String,
    pub default_port: u16,
    /// Directory holding the per-worker ssh control sockets.
    pub control_dir: String,
    pub control_persist_secs: u64,
    /// Paths removed per remote round trip.
    pub removal_batch_size: usize,
    /// Upper bound on the start-up delay of a single transfer.
    pub pacing_cap_secs: u64,
    pub progress_every: u64,
    /// Command run on a storage server that prints NUL separated namespace
    /// links, e.g. a copy of this tool: `/usr/local/bin/xrd-janitor emit-entries`.
    pub remote_lister: Option<String>,
    pub daemon_names: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ssh_path: "/usr/bin/ssh".to_string(),
            rsync_path: "/usr/bin/rsync".to_string(),
            default_user: "root".to_string(),
            default_port: 22,
            control_dir: "/dev/shm".to_string(),
            control_persist_secs: 1200,
            removal_batch_size: 100,
            pacing_cap_secs: 10,
            progress_every: 1000,
            remote_lister: None,
            daemon_names: vec!["xrootd".to_string(), "cmsd".to_string()],
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("xrd-janitor").required(false))
        .add_source(Environment::with_prefix("XRD_JANITOR"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Twice the available processing units, the default size of every worker pool.
pub fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        let dir_path: &Path = &dir;
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.starts_with(dir_path));
        result.push(dir);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_non_overlapping_no_overlap() {
        let result = non_overlapping_directories(paths(&["/data/01", "/data/02", "/srv/xrd"]));
        assert_eq!(result, paths(&["/data/01", "/data/02", "/srv/xrd"]));
    }

    #[test]
    fn test_non_overlapping_with_subdirectory() {
        let result = non_overlapping_directories(paths(&["/data", "/data/01", "/srv/xrd"]));
        assert_eq!(result, paths(&["/data", "/srv/xrd"]));
    }

    #[test]
    fn test_non_overlapping_parent_after_children() {
        let result = non_overlapping_directories(paths(&["/data/01", "/data/02", "/data"]));
        assert_eq!(result, paths(&["/data"]));
    }

    #[test]
    fn test_non_overlapping_sibling_prefix_is_not_nested() {
        // "/data10" shares a string prefix with "/data1" but is not below it
        let result = non_overlapping_directories(paths(&["/data1", "/data10"]));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.default_user, "root");
        assert_eq!(config.default_port, 22);
        assert_eq!(config.removal_batch_size, 100);
        assert!(default_concurrency() >= 2);
    }
}
