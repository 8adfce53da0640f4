use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout};

use chrono::{DateTime, Local};
use rayon::prelude::*;
use tracing::{debug, error, info};

use super::ServerSpec;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::scanner;
use crate::transport::{shell_quote, RemoteShell, TransportError};

pub type EntryStream = Box<dyn Iterator<Item = io::Result<String>> + Send>;

/// Produces a server's namespace links as physical paths in byte order.
pub trait EntrySource: Send + Sync {
    fn sorted_entries(&self, server: &ServerSpec) -> Result<EntryStream>;
}

/// NUL separated records read from a child's standard output. The child is
/// reaped at end of stream and a non-zero exit becomes a final error.
struct ChildRecords {
    child: Child,
    reader: BufReader<ChildStdout>,
    command: String,
    finished: bool,
}

impl Iterator for ChildRecords {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<io::Result<String>> {
        if self.finished {
            return None;
        }
        let mut record = Vec::new();
        match self.reader.read_until(b'\0', &mut record) {
            Ok(0) => {
                self.finished = true;
                match self.child.wait() {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some(Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("'{}' exited with {}", self.command, status),
                    ))),
                    Err(err) => Some(Err(err)),
                }
            }
            Ok(_) => {
                if record.last() == Some(&0) {
                    record.pop();
                }
                Some(Ok(String::from_utf8_lossy(&record).into_owned()))
            }
            Err(err) => {
                self.finished = true;
                let _ = self.child.kill();
                let _ = self.child.wait();
                Some(Err(err))
            }
        }
    }
}

/// Lists links on the server itself and sorts them there with `LC_ALL=C`,
/// streaming the result back.
pub struct RemoteEntrySource {
    shell: RemoteShell,
    lister: Option<String>,
}

impl RemoteEntrySource {
    /// `lister` is a command that prints NUL separated links under the
    /// namespace passed as its last argument; `find` is used when absent.
    pub fn new(shell: RemoteShell, lister: Option<String>) -> Self {
        Self { shell, lister }
    }

    fn script(&self, server: &ServerSpec) -> String {
        let namespace = shell_quote(&server.namespace);
        let list = match &self.lister {
            Some(lister) => format!("{} {}", lister, namespace),
            None => format!("/usr/bin/find {} -type l -print0", namespace),
        };
        format!("{} | LC_ALL=C /usr/bin/sort -z", list)
    }
}

impl EntrySource for RemoteEntrySource {
    fn sorted_entries(&self, server: &ServerSpec) -> Result<EntryStream> {
        let script = self.script(server);
        let mut child = self.shell.spawn_reader(&server.host, &script)?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Spawn {
            command: script.clone(),
            source: io::Error::new(io::ErrorKind::Other, "no stdout captured"),
        })?;
        Ok(Box::new(ChildRecords {
            child,
            reader: BufReader::new(stdout),
            command: script,
            finished: false,
        }))
    }
}

/// Scans a namespace on this host and sorts the links in memory.
pub struct LocalEntrySource {
    concurrency: usize,
}

impl LocalEntrySource {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }
}

impl EntrySource for LocalEntrySource {
    fn sorted_entries(&self, server: &ServerSpec) -> Result<EntryStream> {
        let mut links = namespace_links(Path::new(&server.namespace), self.concurrency)?;
        links.sort_unstable();
        Ok(Box::new(links.into_iter().map(Ok)))
    }
}

/// Picks the local scanner for `localhost` and the remote one otherwise.
pub struct HostEntrySource {
    pub local: LocalEntrySource,
    pub remote: RemoteEntrySource,
}

impl EntrySource for HostEntrySource {
    fn sorted_entries(&self, server: &ServerSpec) -> Result<EntryStream> {
        if server.host.is_local() {
            self.local.sorted_entries(server)
        } else {
            self.remote.sorted_entries(server)
        }
    }
}

/// Every link below `namespace`, unsorted, as strings.
pub fn namespace_links(namespace: &Path, concurrency: usize) -> Result<Vec<String>> {
    crate::error::require_dir(namespace)?;
    Ok(scanner::scan(namespace, concurrency)?
        .flat_map(|listing| listing.links)
        .map(|link| link.to_string_lossy().into_owned())
        .collect())
}

/// Writes every link below `namespace` to `out`, each followed by a NUL.
pub fn emit_entries<W: Write>(namespace: &Path, concurrency: usize, out: W) -> Result<u64> {
    crate::error::require_dir(namespace)?;
    let mut out = BufWriter::new(out);
    let mut emitted = 0;
    for listing in scanner::scan(namespace, concurrency)? {
        for link in listing.links {
            out.write_all(link.to_string_lossy().as_bytes())?;
            out.write_all(b"\0")?;
            emitted += 1;
        }
    }
    out.flush()?;
    Ok(emitted)
}

/// Removes `entries` (namespace links) and the files they point to on
/// `server`, `batch_size` links per round trip. Returns the number of
/// entries whose batch failed.
pub fn remove_on_server(
    shell: &RemoteShell,
    server: &ServerSpec,
    entries: &[String],
    batch_size: usize,
    reporter: &dyn ProgressReporter,
) -> usize {
    let mut failed = 0;
    let mut done = 0;
    for batch in entries.chunks(batch_size.max(1)) {
        let mut script = "/bin/rm -f".to_string();
        for entry in batch {
            let quoted = shell_quote(entry);
            script.push_str(&format!(" \"$(/usr/bin/readlink -f {quoted})\" {quoted}"));
        }
        if let Err(err) = shell.run(&server.host, None, &script) {
            error!("Removing a batch of {} entries on {} failed: {}", batch.len(), server.name(), err);
            failed += batch.len();
        }
        done += batch.len();
        reporter.on_removal(done, entries.len());
    }
    info!(
        "Removed {} duplicate entries on {} ({} failed)",
        entries.len() - failed,
        server.name(),
        failed
    );
    failed
}

#[derive(Debug, Clone)]
pub struct CollectSummary {
    pub server_files: Vec<(String, PathBuf, usize)>,
    pub all_servers_file: PathBuf,
    pub distinct_entries: usize,
}

/// Collects every server's logical entries concurrently and writes one
/// sorted list per server plus one list of all distinct entries to `out_dir`.
pub fn collect_lists(
    servers: &[ServerSpec],
    source: &dyn EntrySource,
    out_dir: &Path,
    now: DateTime<Local>,
) -> Result<CollectSummary> {
    let stamp = now.format("%Y-%m-%dT%H:%M:%S").to_string();

    let per_server: Vec<BTreeSet<String>> = servers
        .par_iter()
        .map(|server| -> Result<BTreeSet<String>> {
            debug!("Collecting entries from {}", server);
            let mut entries = BTreeSet::new();
            for entry in source.sorted_entries(server)? {
                let entry = entry?;
                if !entry.is_empty() {
                    entries.insert(server.logical_key(&entry).to_string());
                }
            }
            Ok(entries)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut server_files = Vec::with_capacity(servers.len());
    let mut all_entries: BTreeSet<&str> = BTreeSet::new();
    for (server, entries) in servers.iter().zip(&per_server) {
        let path = out_dir.join(format!("{}-{}_file_list.txt", server.name(), stamp));
        write_list(&path, &stamp, entries.iter().map(String::as_str))?;
        all_entries.extend(entries.iter().map(String::as_str));
        server_files.push((server.name().to_string(), path, entries.len()));
    }

    let all_servers_file = out_dir.join(format!("ALL_SERVERS-{}_file_list.txt", stamp));
    write_list(&all_servers_file, &stamp, all_entries.iter().copied())?;
    info!(
        "Collected {} distinct entries from {} servers",
        all_entries.len(),
        servers.len()
    );

    Ok(CollectSummary {
        server_files,
        distinct_entries: all_entries.len(),
        all_servers_file,
    })
}

fn write_list<'a>(path: &Path, stamp: &str, entries: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "List from {}", stamp)?;
    for entry in entries {
        writeln!(out, "{}", entry)?;
    }
    out.flush()?;
    Ok(())
}
