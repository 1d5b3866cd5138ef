//! CSV-backed lookup provider.
//!
//! Reads `CompRanges.csv` (Job Title, Location, Currency, Min, Max) and
//! `EmployeeRoster.csv` (Name, Job Title, Job Family, Proficiency, Location,
//! Compensation). Both files are parsed once on first use and kept in memory;
//! [`CsvLookup::reload`] drops the cache. Rows that cannot be parsed are
//! skipped with a warning, but a file missing a required column is an error.

use async_trait::async_trait;
use compagent_core::candidate::Location;
use compagent_core::error::LookupError;
use compagent_core::lookup::{Catalog, LookupProvider, LookupTable, MarketRow, ParityRow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::tables::{Tables, parse_amount};

const MARKET_COLUMNS: [&str; 4] = ["Job Title", "Location", "Min", "Max"];
const PARITY_COLUMNS: [&str; 4] = ["Job Title", "Location", "Proficiency", "Compensation"];

#[derive(Debug, Deserialize)]
struct MarketRecord {
    #[serde(rename = "Job Title")]
    job_title: String,
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Currency", default)]
    currency: Option<String>,
    #[serde(rename = "Min")]
    min: String,
    #[serde(rename = "Max")]
    max: String,
}

#[derive(Debug, Deserialize)]
struct EmployeeRecord {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Job Title")]
    job_title: String,
    #[serde(rename = "Job Family", default)]
    job_family: Option<String>,
    #[serde(rename = "Proficiency")]
    proficiency: String,
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Compensation")]
    compensation: String,
}

/// Lookup provider over the two CSV files.
pub struct CsvLookup {
    market_path: PathBuf,
    roster_path: PathBuf,
    tables: RwLock<Option<Arc<Tables>>>,
}

impl CsvLookup {
    pub fn new(market_path: impl Into<PathBuf>, roster_path: impl Into<PathBuf>) -> Self {
        Self {
            market_path: market_path.into(),
            roster_path: roster_path.into(),
            tables: RwLock::new(None),
        }
    }

    /// Both files from one directory, with their standard names.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            dir.join(LookupTable::Market.source_name()),
            dir.join(LookupTable::Parity.source_name()),
        )
    }

    /// Forget the parsed tables; the next lookup re-reads the files.
    pub async fn reload(&self) {
        *self.tables.write().await = None;
    }

    async fn tables(&self) -> Result<Arc<Tables>, LookupError> {
        if let Some(tables) = self.tables.read().await.as_ref() {
            return Ok(tables.clone());
        }

        let mut slot = self.tables.write().await;
        if let Some(tables) = slot.as_ref() {
            return Ok(tables.clone());
        }

        let market_path = self.market_path.clone();
        let roster_path = self.roster_path.clone();
        let loaded = tokio::task::spawn_blocking(move || -> Result<Tables, LookupError> {
            Ok(Tables::new(
                read_market(&market_path)?,
                read_roster(&roster_path)?,
            ))
        })
        .await
        .map_err(|e| LookupError::TableUnavailable {
            table: "tables".into(),
            reason: e.to_string(),
        })??;

        debug!(
            market_rows = loaded.market.len(),
            parity_rows = loaded.parity.len(),
            "Compensation tables loaded"
        );

        let tables = Arc::new(loaded);
        *slot = Some(tables.clone());
        Ok(tables)
    }
}

#[async_trait]
impl LookupProvider for CsvLookup {
    fn name(&self) -> &str {
        "csv"
    }

    async fn market_rows(
        &self,
        job_title: &str,
        location: &str,
    ) -> Result<Vec<MarketRow>, LookupError> {
        Ok(self.tables().await?.market_rows(job_title, location))
    }

    async fn parity_rows(
        &self,
        job_title: &str,
        location: &str,
    ) -> Result<Vec<ParityRow>, LookupError> {
        Ok(self.tables().await?.parity_rows(job_title, location))
    }

    async fn catalog(&self) -> Result<Catalog, LookupError> {
        Ok(self.tables().await?.catalog())
    }
}

fn open(path: &Path, table: LookupTable) -> Result<csv::Reader<std::fs::File>, LookupError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| LookupError::TableUnavailable {
            table: table.source_name().into(),
            reason: format!("{}: {e}", path.display()),
        })
}

fn check_columns(
    reader: &mut csv::Reader<std::fs::File>,
    table: LookupTable,
    required: &[&str],
) -> Result<csv::StringRecord, LookupError> {
    let headers = reader
        .headers()
        .map_err(|e| LookupError::MalformedRow {
            table: table.source_name().into(),
            line: 1,
            reason: e.to_string(),
        })?
        .clone();

    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(LookupError::MalformedRow {
                table: table.source_name().into(),
                line: 1,
                reason: format!("missing column '{column}'"),
            });
        }
    }
    Ok(headers)
}

fn read_market(path: &Path) -> Result<Vec<MarketRow>, LookupError> {
    let table = LookupTable::Market;
    let mut reader = open(path, table)?;
    let headers = check_columns(&mut reader, table, &MARKET_COLUMNS)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(table = table.source_name(), error = %e, "Skipping unreadable row");
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());

        let parsed: MarketRecord = match record.deserialize(Some(&headers)) {
            Ok(r) => r,
            Err(e) => {
                warn!(table = table.source_name(), line, error = %e, "Skipping malformed row");
                continue;
            }
        };

        let (Some(min), Some(max)) = (parse_amount(&parsed.min), parse_amount(&parsed.max)) else {
            warn!(table = table.source_name(), line, "Skipping row with invalid Min/Max");
            continue;
        };
        if min > max {
            warn!(table = table.source_name(), line, min, max, "Skipping row with Min above Max");
            continue;
        }

        let currency = parsed
            .currency
            .filter(|c| !c.is_empty())
            .or_else(|| {
                parsed
                    .location
                    .parse::<Location>()
                    .ok()
                    .map(|l| l.currency().to_string())
            })
            .unwrap_or_else(|| "USD".to_string());

        rows.push(MarketRow {
            job_title: parsed.job_title,
            location: parsed.location.to_ascii_uppercase(),
            currency,
            min,
            max,
        });
    }
    Ok(rows)
}

fn read_roster(path: &Path) -> Result<Vec<ParityRow>, LookupError> {
    let table = LookupTable::Parity;
    let mut reader = open(path, table)?;
    let headers = check_columns(&mut reader, table, &PARITY_COLUMNS)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(table = table.source_name(), error = %e, "Skipping unreadable row");
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());

        let parsed: EmployeeRecord = match record.deserialize(Some(&headers)) {
            Ok(r) => r,
            Err(e) => {
                warn!(table = table.source_name(), line, error = %e, "Skipping malformed row");
                continue;
            }
        };

        let Some(compensation) = parse_amount(&parsed.compensation) else {
            warn!(table = table.source_name(), line, "Skipping row with invalid Compensation");
            continue;
        };

        rows.push(ParityRow {
            name: parsed.name,
            job_title: parsed.job_title,
            job_family: parsed.job_family.filter(|f| !f.is_empty()),
            proficiency: parsed.proficiency,
            location: parsed.location.to_ascii_uppercase(),
            compensation,
        });
    }
    Ok(rows)
}
