//! External collaborators: moving bytes and running commands on a
//! destination host. Everything is a whole command with a success/failure
//! status.

mod host;
mod shell;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub use host::{Host, OwnerGroup};
pub use shell::{running_daemons, shell_quote, RemoteShell, ShellTransport};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Failed { command: String, code: Option<i32> },
}

/// Identifies one worker's persistent control connection for a run.
///
/// Created and owned by a single worker; never shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub run_id: String,
    pub worker: usize,
}

impl ConnectionId {
    pub fn new(run_id: &str, worker: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            worker,
        }
    }

    pub fn socket_name(&self) -> String {
        format!(".xrd-janitor-{}-{:04}.socket", self.run_id, self.worker)
    }
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Random-looking identifier for one run, derived from the source root,
/// the process id and the start time.
pub fn new_run_id(seed: &Path) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.to_string_lossy().as_bytes());
    hasher.update(&process::id().to_le_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&RUN_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

/// Destination side of a migration.
pub trait Transport: Send + Sync {
    /// True when the destination is this host.
    fn is_local(&self) -> bool {
        false
    }

    /// Creates every directory in `dirs`, with parents.
    fn make_dirs(&self, conn: &ConnectionId, dirs: &[&Path]) -> Result<(), TransportError>;

    /// Copies one local file to `destination`, preserving attributes.
    fn copy_file(
        &self,
        conn: &ConnectionId,
        source: &Path,
        destination: &Path,
    ) -> Result<(), TransportError>;

    /// Points `link` at `target` (replacing any existing link) and applies
    /// `owner` to the link and to every path in `also_chown`.
    fn link_and_chown(
        &self,
        conn: &ConnectionId,
        target: &Path,
        link: &Path,
        owner: &OwnerGroup,
        also_chown: &[PathBuf],
    ) -> Result<(), TransportError>;

    /// Creates, chowns and removes a probe file in `dir`.
    fn probe_writable(
        &self,
        conn: &ConnectionId,
        dir: &Path,
        owner: &OwnerGroup,
    ) -> Result<(), TransportError>;

    /// Tears down the control connection, if any.
    fn close(&self, _conn: &ConnectionId) {}
}
