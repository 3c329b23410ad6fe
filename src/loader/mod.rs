//! Reads a previously written artifact back into records.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::models::{Field, ListingRecord};

/// Parse an artifact written by [`crate::storage::CsvSink`]. Columns are matched
/// by header name; unknown columns are ignored and absent ones read as Missing.
pub fn load_records(path: &Path) -> Result<Vec<ListingRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let headers = reader.headers()?.clone();
    let positions: Vec<Option<usize>> = Field::ALL
        .iter()
        .map(|f| headers.iter().position(|h| h.trim() == f.column()))
        .collect();

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {:?}: {}", i + 1, path, e);
                continue;
            }
        };
        let cells = positions
            .iter()
            .map(|p| p.and_then(|idx| row.get(idx)).unwrap_or(""));
        records.push(ListingRecord::from_row(cells));
    }

    debug!("{:?}: {} records loaded", path, records.len());
    Ok(records)
}

/// Identity keys already present in an artifact; empty if it does not exist yet.
pub fn seen_urls(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    Ok(load_records(path)?
        .into_iter()
        .filter_map(|r| r.source_url)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_matched_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "source_url,title,extra\nhttps://x/1,Dev,foo\nhttps://x/2,N/A,bar\n",
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title.as_deref(), Some("Dev"));
        assert_eq!(records[0].source_url.as_deref(), Some("https://x/1"));
        assert_eq!(records[1].title, None);
        assert_eq!(records[1].location, None);
    }

    #[test]
    fn test_seen_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        assert!(seen_urls(&path).unwrap().is_empty());

        std::fs::write(&path, "title,source_url\nA,https://x/1\nB,https://x/2\nC,N/A\n").unwrap();
        let seen = seen_urls(&path).unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("https://x/2"));
    }
}
