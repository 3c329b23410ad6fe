pub mod sink;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, params};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::models::{CrawlStats, ListingRecord};

pub use self::sink::CsvSink;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS crawl_runs_seq START 1;

CREATE TABLE IF NOT EXISTS crawl_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('crawl_runs_seq'),
    site                VARCHAR NOT NULL,
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    keywords            INTEGER DEFAULT 0,
    skipped_keywords    INTEGER DEFAULT 0,
    pages               INTEGER DEFAULT 0,
    records             INTEGER DEFAULT 0,
    duplicates          INTEGER DEFAULT 0,
    card_failures       INTEGER DEFAULT 0,
    detail_failures     INTEGER DEFAULT 0,
    retries             INTEGER DEFAULT 0,
    artifact            VARCHAR,
    error_msg           VARCHAR
);

-- Identity keys captured per site, across runs
CREATE TABLE IF NOT EXISTS seen_listings (
    site            VARCHAR NOT NULL,
    source_url      VARCHAR NOT NULL,
    title           VARCHAR,
    search_keyword  VARCHAR,
    first_seen      TIMESTAMP NOT NULL,
    last_seen       TIMESTAMP NOT NULL,
    run_id          INTEGER,
    PRIMARY KEY (site, source_url)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

// Columns added after the first release; no-ops on a fresh ledger.
const UPGRADES: &str = r#"
ALTER TABLE crawl_runs ADD COLUMN IF NOT EXISTS retries INTEGER DEFAULT 0;
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_runs_site    ON crawl_runs (site);
CREATE INDEX IF NOT EXISTS idx_seen_site    ON seen_listings (site);
"#;

/// One row of the run ledger.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: i64,
    pub site: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
    pub pages: i64,
    pub records: i64,
    pub retries: i64,
    pub artifact: Option<String>,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn
            .execute_batch(UPGRADES)
            .context("Schema upgrade failed")?;
        self.conn
            .execute_batch(INDEXES)
            .context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Run ledger ────────────────────────────────────────────────────────────

    pub fn begin_run(&self, site: &str) -> Result<i64> {
        let id: i64 = self
            .conn
            .query_row(
                "INSERT INTO crawl_runs (site, started_at, status) VALUES (?, ?, 'running') RETURNING id",
                params![site, Utc::now().naive_utc()],
                |r| r.get(0),
            )
            .with_context(|| format!("begin run for {}", site))?;
        Ok(id)
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        stats: &CrawlStats,
        artifact: Option<&Path>,
        error: Option<&str>,
    ) -> Result<()> {
        let status = match (error, stats.cancelled) {
            (Some(_), _) => "error",
            (None, true) => "cancelled",
            (None, false) => "success",
        };
        self.conn.execute(
            r#"UPDATE crawl_runs SET
               finished_at = ?, status = ?,
               keywords = ?, skipped_keywords = ?, pages = ?, records = ?,
               duplicates = ?, card_failures = ?, detail_failures = ?,
               retries = ?, artifact = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                status,
                stats.keywords as i64,
                stats.skipped_keywords as i64,
                stats.pages as i64,
                stats.records as i64,
                stats.duplicates as i64,
                stats.card_failures as i64,
                stats.detail_failures as i64,
                stats.retries as i64,
                artifact.map(|p| p.display().to_string()),
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, site, started_at, finished_at, status, pages, records, retries, artifact
               FROM crawl_runs ORDER BY id DESC LIMIT ?"#,
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                Ok(RunRow {
                    id: r.get(0)?,
                    site: r.get(1)?,
                    started_at: r.get(2)?,
                    finished_at: r.get(3)?,
                    status: r.get(4)?,
                    pages: r.get::<_, Option<i64>>(5)?.unwrap_or(0),
                    records: r.get::<_, Option<i64>>(6)?.unwrap_or(0),
                    retries: r.get::<_, Option<i64>>(7)?.unwrap_or(0),
                    artifact: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Seen listings ─────────────────────────────────────────────────────────

    /// Record identity keys; idempotent, re-marking only bumps `last_seen`.
    pub fn mark_seen(&self, site: &str, run_id: i64, records: &[ListingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let tx = self.conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO seen_listings
                (site, source_url, title, search_keyword, first_seen, last_seen, run_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (site, source_url) DO UPDATE SET
                title     = COALESCE(excluded.title, seen_listings.title),
                last_seen = excluded.last_seen,
                run_id    = excluded.run_id
        "#;

        let mut marked = 0;
        for record in records {
            let Some(url) = &record.source_url else {
                continue;
            };
            tx.execute(
                sql,
                params![site, url, record.title, record.search_keyword, now, now, run_id],
            )
            .with_context(|| format!("mark seen {}", url))?;
            marked += 1;
        }

        tx.commit()?;
        Ok(marked)
    }

    pub fn seen_urls(&self, site: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_url FROM seen_listings WHERE site = ?")?;
        let urls = stmt
            .query_map(params![site], |r| r.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(urls)
    }
}
