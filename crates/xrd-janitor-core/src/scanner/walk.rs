use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{trace, warn};

use super::{DirListing, ScanError};

/// Listings buffered per worker before workers block on the consumer.
const LISTINGS_PER_WORKER: usize = 16;

/// Lazy sequence of directory listings produced by a pool of scan workers.
///
/// Dropping the walk early cancels the remaining work and joins the workers.
pub struct Walk {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    /// Workers that have not yet delivered their completion marker.
    running: usize,
    errors: Receiver<ScanError>,
}

struct Shared {
    state: Mutex<State>,
    work_available: Condvar,
    result_available: Condvar,
    space_available: Condvar,
    /// Upper bound on buffered listings; completion markers are not counted.
    capacity: usize,
    errors: Sender<ScanError>,
}

struct State {
    frontier: Vec<PathBuf>,
    /// Directories pushed to the frontier and not yet fully listed.
    outstanding: usize,
    /// `None` is a worker's completion marker.
    output: VecDeque<Option<DirListing>>,
    /// Listings in `output`.
    buffered: usize,
    cancelled: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Walks `root` with `concurrency` worker threads.
///
/// A root that is not a directory yields an empty walk. Workers pause once
/// the consumer falls behind by more than a few listings each.
pub fn scan(root: &Path, concurrency: usize) -> crate::Result<Walk> {
    let concurrency = concurrency.max(1);
    start(root, concurrency, concurrency * LISTINGS_PER_WORKER)
}

fn start(root: &Path, concurrency: usize, capacity: usize) -> crate::Result<Walk> {
    let (error_tx, error_rx) = unbounded();
    let is_dir = root.is_dir();
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            frontier: if is_dir { vec![root.to_path_buf()] } else { Vec::new() },
            outstanding: usize::from(is_dir),
            output: VecDeque::new(),
            buffered: 0,
            cancelled: false,
        }),
        work_available: Condvar::new(),
        result_available: Condvar::new(),
        space_available: Condvar::new(),
        capacity: capacity.max(1),
        errors: error_tx,
    });

    let mut workers = Vec::with_capacity(concurrency);
    if is_dir {
        for id in 0..concurrency {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("scan-{}", id))
                .spawn(move || worker_loop(&shared))?;
            workers.push(handle);
        }
    }

    Ok(Walk {
        running: workers.len(),
        shared,
        workers,
        errors: error_rx,
    })
}

impl Walk {
    /// Errors for subtrees that were skipped. Fully populated once the walk is exhausted.
    pub fn errors(&self) -> Receiver<ScanError> {
        self.errors.clone()
    }
}

impl Iterator for Walk {
    type Item = DirListing;

    fn next(&mut self) -> Option<DirListing> {
        let mut state = self.shared.lock();
        loop {
            match state.output.pop_front() {
                Some(Some(listing)) => {
                    state.buffered -= 1;
                    self.shared.space_available.notify_one();
                    return Some(listing);
                }
                Some(None) => self.running -= 1,
                None if self.running == 0 => return None,
                None => {
                    state = self
                        .shared
                        .result_available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

impl Drop for Walk {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.cancelled = true;
            state.frontier.clear();
            self.shared.work_available.notify_all();
            self.shared.space_available.notify_all();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let dir = {
            let mut state = shared.lock();
            loop {
                if state.outstanding == 0 || state.cancelled {
                    state.output.push_back(None);
                    shared.result_available.notify_one();
                    return;
                }
                if let Some(dir) = state.frontier.pop() {
                    break dir;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let listing = list_dir(&dir, &shared.errors);

        let mut state = shared.lock();
        match listing {
            Ok(listing) => {
                if !state.cancelled && !listing.dirs.is_empty() {
                    state.outstanding += listing.dirs.len();
                    state.frontier.extend(listing.dirs.iter().cloned());
                    shared.work_available.notify_all();
                }
                while state.buffered >= shared.capacity && !state.cancelled {
                    state = shared
                        .space_available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if !state.cancelled {
                    state.output.push_back(Some(listing));
                    state.buffered += 1;
                    shared.result_available.notify_one();
                }
            }
            Err(source) => {
                warn!("Skipping {}: {}", dir.display(), source);
                let _ = shared.errors.send(ScanError { path: dir, source });
            }
        }
        state.outstanding -= 1;
        if state.outstanding == 0 {
            shared.work_available.notify_all();
        }
    }
}

/// Lists one directory, classifying children from the directory entry's own
/// type information.
fn list_dir(dir: &Path, errors: &Sender<ScanError>) -> io::Result<DirListing> {
    trace!("Listing {}", dir.display());
    let mut listing = DirListing {
        path: dir.to_path_buf(),
        ..DirListing::default()
    };

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                let _ = errors.send(ScanError {
                    path: dir.to_path_buf(),
                    source,
                });
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(source) => {
                let _ = errors.send(ScanError {
                    path: entry.path(),
                    source,
                });
                continue;
            }
        };

        let path = entry.path();
        if file_type.is_symlink() {
            listing.links.push(path);
        } else if file_type.is_dir() {
            listing.dirs.push(path);
        } else {
            listing.files.push(path);
        }
    }

    Ok(listing)
}
