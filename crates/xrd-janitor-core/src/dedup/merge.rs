use std::io;
use tracing::{debug, trace};

use crate::progress::ProgressReporter;

/// One server's sorted entry stream, positioned on its current head.
struct Cursor<I> {
    server: usize,
    prefix: String,
    entries: I,
    head: Option<String>,
}

impl<I> Cursor<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    fn advance(&mut self) -> io::Result<()> {
        self.head = None;
        for entry in self.entries.by_ref() {
            let entry = entry?;
            if !entry.is_empty() {
                self.head = Some(entry);
                break;
            }
        }
        Ok(())
    }

    fn key(&self) -> &str {
        let head = self.head.as_deref().unwrap_or_default();
        head.strip_prefix(self.prefix.as_str()).unwrap_or(head)
    }
}

/// Result of a dedup merge.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupPlan {
    /// Physical entries to delete, indexed like the input streams.
    pub removals: Vec<Vec<String>>,
    /// Logical keys present on more than one server.
    pub groups: usize,
    pub keys_compared: u64,
}

impl DedupPlan {
    pub fn total_removals(&self) -> usize {
        self.removals.iter().map(Vec::len).sum()
    }
}

/// Streams a k-way merge over per-server sorted entries and schedules every
/// logical key found on more than one server for deletion everywhere but
/// one place.
///
/// `streams[i]` is `(namespace prefix, sorted physical entries)` of server
/// `i`; server 0 is authoritative and never loses an entry. When it does not
/// hold a key, the lowest-indexed holder keeps it. Only one head per stream
/// is buffered.
pub fn merge_sorted<I>(
    streams: Vec<(String, I)>,
    reporter: &dyn ProgressReporter,
) -> io::Result<DedupPlan>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut plan = DedupPlan {
        removals: vec![Vec::new(); streams.len()],
        ..DedupPlan::default()
    };

    let mut cursors = Vec::with_capacity(streams.len());
    for (server, (prefix, entries)) in streams.into_iter().enumerate() {
        let mut cursor = Cursor {
            server,
            prefix,
            entries,
            head: None,
        };
        cursor.advance()?;
        if cursor.head.is_some() {
            cursors.push(cursor);
        }
    }

    // A single remaining stream cannot have duplicates.
    while cursors.len() > 1 {
        let smallest = (0..cursors.len())
            .min_by(|&a, &b| cursors[a].key().cmp(cursors[b].key()))
            .unwrap_or(0);
        let matching: Vec<usize> = (0..cursors.len())
            .filter(|&i| cursors[i].key() == cursors[smallest].key())
            .collect();
        plan.keys_compared += 1;

        if matching.len() > 1 {
            // cursors stay ordered by server index, so the first match is the keeper
            let keeper = matching[0];
            trace!(
                "Duplicate {} kept on server {}",
                cursors[keeper].key(),
                cursors[keeper].server
            );
            for &i in &matching[1..] {
                if let Some(head) = cursors[i].head.clone() {
                    plan.removals[cursors[i].server].push(head);
                }
            }
            plan.groups += 1;
        }

        for &i in &matching {
            cursors[i].advance()?;
        }
        cursors.retain(|cursor| cursor.head.is_some());

        if plan.keys_compared % 100_000 == 0 {
            reporter.on_merge_progress(plan.keys_compared);
        }
    }

    debug!(
        "Merge compared {} keys, {} duplicate groups, {} removals",
        plan.keys_compared,
        plan.groups,
        plan.total_removals()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;

    type Stream = std::vec::IntoIter<io::Result<String>>;

    fn stream(prefix: &str, keys: &[&str]) -> (String, Stream) {
        let entries: Vec<io::Result<String>> = keys
            .iter()
            .map(|key| Ok(format!("{}{}", prefix, key)))
            .collect();
        (prefix.to_string(), entries.into_iter())
    }

    #[test]
    fn test_three_way_merge() {
        let plan = merge_sorted(
            vec![
                stream("/a/ns/", &["x", "y", "z"]),
                stream("/b/", &["y"]),
                stream("/srv/c/", &["y", "z"]),
            ],
            &SilentReporter,
        )
        .unwrap();

        assert_eq!(plan.groups, 2);
        assert!(plan.removals[0].is_empty());
        assert_eq!(plan.removals[1], vec!["/b/y".to_string()]);
        assert_eq!(plan.removals[2], vec!["/srv/c/y".to_string(), "/srv/c/z".to_string()]);
    }

    #[test]
    fn test_keeper_when_authoritative_server_lacks_key() {
        let plan = merge_sorted(
            vec![
                stream("/a/", &["a"]),
                stream("/b/", &["m"]),
                stream("/c/", &["m"]),
            ],
            &SilentReporter,
        )
        .unwrap();
        assert_eq!(plan.groups, 1);
        assert!(plan.removals[1].is_empty());
        assert_eq!(plan.removals[2], vec!["/c/m".to_string()]);
    }

    #[test]
    fn test_single_or_empty_streams() {
        let plan = merge_sorted(vec![stream("/a/", &["x", "y"])], &SilentReporter).unwrap();
        assert_eq!(plan.groups, 0);

        let plan = merge_sorted(
            vec![stream("/a/", &[]), stream("/b/", &["x"])],
            &SilentReporter,
        )
        .unwrap();
        assert_eq!(plan.total_removals(), 0);
    }

    #[test]
    fn test_stream_error_aborts_merge() {
        let failing: Vec<io::Result<String>> = vec![
            Ok("/b/a".to_string()),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "ssh died")),
        ];
        let result = merge_sorted(
            vec![
                stream("/a/", &["a", "b"]),
                ("/b/".to_string(), failing.into_iter()),
            ],
            &SilentReporter,
        );
        assert!(result.is_err());
    }
}
