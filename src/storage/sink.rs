use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing::info;

use crate::models::ListingRecord;

/// Tabular artifact for one logical target. Repeated writes append; the header
/// row is written only while the file is new or empty.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write(&self, records: &[ListingRecord]) -> Result<usize> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }

        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Could not open {:?}", self.path))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(ListingRecord::header())?;
        }
        for record in records {
            writer
                .write_record(record.to_row())
                .with_context(|| format!("write row to {:?}", self.path))?;
        }
        writer.flush()?;

        info!("📁 {} records saved to {:?}", records.len(), self.path);
        Ok(records.len())
    }
}
