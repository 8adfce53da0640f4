//! Cross-server deduplication.
//!
//! Each server lists its namespace links sorted on its own side; the lists
//! are then merged as streams so memory stays at one entry per server.

mod collect;
mod merge;
mod server;

use tracing::info;

use crate::error::Result;
use crate::progress::ProgressReporter;

pub use collect::{
    collect_lists, emit_entries, namespace_links, remove_on_server, CollectSummary, EntrySource,
    EntryStream, HostEntrySource, LocalEntrySource, RemoteEntrySource,
};
pub use merge::{merge_sorted, DedupPlan};
pub use server::ServerSpec;

/// Opens every server's sorted stream and merges them. `servers[0]` is
/// authoritative.
pub fn find_duplicates(
    servers: &[ServerSpec],
    source: &dyn EntrySource,
    reporter: &dyn ProgressReporter,
) -> Result<DedupPlan> {
    let mut streams = Vec::with_capacity(servers.len());
    for server in servers {
        info!("Collecting sorted entries from {}", server);
        streams.push((server.namespace.clone(), source.sorted_entries(server)?));
    }

    let plan = merge_sorted(streams, reporter)?;
    info!(
        "{} entries present on more than one server, {} to remove",
        plan.groups,
        plan.total_removals()
    );
    Ok(plan)
}
