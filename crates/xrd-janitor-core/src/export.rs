//! CSV export of removal candidates, used instead of prompting.

use serde::Serialize;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub category: String,
    /// Empty for local findings.
    pub server: String,
    pub path: String,
}

impl CandidateRow {
    pub fn local(category: &str, path: &Path) -> Self {
        Self {
            category: category.to_string(),
            server: String::new(),
            path: path.to_string_lossy().into_owned(),
        }
    }

    pub fn remote(category: &str, server: &str, path: &str) -> Self {
        Self {
            category: category.to_string(),
            server: server.to_string(),
            path: path.to_string(),
        }
    }
}

/// Writes `rows` to `path` with a header line. Returns the number of rows.
pub fn save_candidates<I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = CandidateRow>,
{
    let mut writer = csv::Writer::from_path(path)?;
    let mut written = 0;
    for row in rows {
        writer.serialize(&row)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("candidates.csv");
        let rows = vec![
            CandidateRow::local("dark data", Path::new("/data/01/a")),
            CandidateRow::remote("duplicate", "se2", "/xrd/ns/b"),
        ];
        assert_eq!(save_candidates(&out, rows).unwrap(), 2);

        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "category,server,path");
        assert_eq!(lines[1], "dark data,,/data/01/a");
        assert_eq!(lines[2], "duplicate,se2,/xrd/ns/b");
    }
}
