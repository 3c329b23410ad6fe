use serde::{Deserialize, Serialize};

/// Literal written to the artifact for a field that could not be extracted.
pub const MISSING: &str = "N/A";

// ── Field ─────────────────────────────────────────────────────────────────────

/// One column of a [`ListingRecord`], in artifact order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    SourceUrl,
    Location,
    PostedDate,
    Salary,
    RoleType,
    Level,
    JobId,
    Description,
    SearchKeyword,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Title,
        Field::SourceUrl,
        Field::Location,
        Field::PostedDate,
        Field::Salary,
        Field::RoleType,
        Field::Level,
        Field::JobId,
        Field::Description,
        Field::SearchKeyword,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::SourceUrl => "source_url",
            Field::Location => "location",
            Field::PostedDate => "posted_date",
            Field::Salary => "salary",
            Field::RoleType => "role_type",
            Field::Level => "level",
            Field::JobId => "job_id",
            Field::Description => "description",
            Field::SearchKeyword => "search_keyword",
        }
    }
}

// ── Listing record ────────────────────────────────────────────────────────────

/// One scraped job entry. `None` is the Missing marker for every field.
///
/// `source_url` is the identity key; the harvester refuses cards without one,
/// so every record that reaches the sink carries it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingRecord {
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub location: Option<String>,
    pub posted_date: Option<String>,
    pub salary: Option<String>,
    pub role_type: Option<String>,
    pub level: Option<String>,
    pub job_id: Option<String>,
    pub description: Option<String>,
    pub search_keyword: Option<String>,
}

impl ListingRecord {
    pub fn header() -> Vec<&'static str> {
        Field::ALL.iter().map(|f| f.column()).collect()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    /// Overlay supplementary values; a missing value never erases one already held.
    pub fn enrich(&mut self, values: impl IntoIterator<Item = (Field, Option<String>)>) {
        for (field, value) in values {
            if let Some(v) = value {
                self.set(field, Some(v));
            }
        }
    }

    /// Row in artifact column order, Missing rendered as [`MISSING`].
    pub fn to_row(&self) -> Vec<&str> {
        Field::ALL
            .iter()
            .map(|f| self.get(*f).unwrap_or(MISSING))
            .collect()
    }

    /// Inverse of [`to_row`](Self::to_row): `N/A` and blank cells become Missing.
    pub fn from_row<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut record = ListingRecord::default();
        for (field, cell) in Field::ALL.iter().zip(cells) {
            let cell = cell.trim();
            if !cell.is_empty() && cell != MISSING {
                record.set(*field, Some(cell.to_string()));
            }
        }
        record
    }

    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::Title => &self.title,
            Field::SourceUrl => &self.source_url,
            Field::Location => &self.location,
            Field::PostedDate => &self.posted_date,
            Field::Salary => &self.salary,
            Field::RoleType => &self.role_type,
            Field::Level => &self.level,
            Field::JobId => &self.job_id,
            Field::Description => &self.description,
            Field::SearchKeyword => &self.search_keyword,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::SourceUrl => &mut self.source_url,
            Field::Location => &mut self.location,
            Field::PostedDate => &mut self.posted_date,
            Field::Salary => &mut self.salary,
            Field::RoleType => &mut self.role_type,
            Field::Level => &mut self.level,
            Field::JobId => &mut self.job_id,
            Field::Description => &mut self.description,
            Field::SearchKeyword => &mut self.search_keyword,
        }
    }
}

// ── Run counters ──────────────────────────────────────────────────────────────

/// Per-run tallies, logged as the run summary and kept in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub keywords: usize,
    pub skipped_keywords: usize,
    pub pages: usize,
    pub records: usize,
    pub duplicates: usize,
    pub card_failures: usize,
    pub detail_failures: usize,
    /// Repeated attempts at searches and page loads.
    pub retries: usize,
    pub cancelled: bool,
}
