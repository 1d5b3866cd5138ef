//! Lookup Provider: exact-match access to the two compensation tables.
//!
//! - **Market** (`CompRanges.csv`): one row per job title and location with
//!   currency, min, and max.
//! - **Parity** (`EmployeeRoster.csv`): internal employees; several rows may
//!   match a key, and only min, max, and count may be derived from them.
//!
//! Matching is literal equality on trimmed, case-insensitive keys. A missing
//! row is an empty result, never an error and never an approximation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::candidate::{JobFamily, Location};
use crate::error::LookupError;

/// Which table a row or citation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupTable {
    Market,
    Parity,
}

impl LookupTable {
    /// The literal source name used in citations.
    pub fn source_name(&self) -> &'static str {
        match self {
            Self::Market => "CompRanges.csv",
            Self::Parity => "EmployeeRoster.csv",
        }
    }
}

/// A market compensation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub job_title: String,
    pub location: String,
    pub currency: String,
    pub min: f64,
    pub max: f64,
}

/// An internal employee row used for parity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityRow {
    pub name: String,
    pub job_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_family: Option<String>,
    pub proficiency: String,
    pub location: String,
    pub compensation: f64,
}

/// The (job_title, location) pair a lookup was made for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupKey {
    pub job_title: String,
    pub location: Location,
}

impl LookupKey {
    pub fn new(job_title: impl Into<String>, location: Location) -> Self {
        Self {
            job_title: job_title.into(),
            location,
        }
    }

    /// Same key, comparing titles trimmed and case-insensitively.
    pub fn matches(&self, job_title: &str, location: Location) -> bool {
        self.location == location && titles_equal(&self.job_title, job_title)
    }
}

/// Title equality used by every lookup: trimmed, ASCII case-insensitive.
pub fn titles_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Rows fetched for one key, kept on the candidate record for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLookup {
    pub key: LookupKey,
    /// `None` records a confirmed "no market row" answer.
    pub market: Option<MarketRow>,
    #[serde(default)]
    pub parity: Vec<ParityRow>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedLookup {
    /// Whether this cache can serve the given key.
    pub fn is_fresh_for(&self, job_title: &str, location: Location) -> bool {
        self.key.matches(job_title, location)
    }
}

/// Metadata derived from the tables: the known titles and their families.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Distinct job titles in the market table, in their canonical casing.
    pub titles: Vec<String>,
    /// Lowercased title to the job family recorded in the roster.
    pub families: BTreeMap<String, JobFamily>,
}

impl Catalog {
    /// Canonical casing of a title the tables know about.
    pub fn canonical_title(&self, title: &str) -> Option<&str> {
        self.titles
            .iter()
            .find(|known| titles_equal(known, title))
            .map(String::as_str)
    }

    /// The family the roster associates with a title.
    pub fn family_for(&self, title: &str) -> Option<JobFamily> {
        self.families.get(&title.trim().to_lowercase()).copied()
    }
}

/// The lookup capability.
///
/// Implementations: CSV files on disk, in-memory tables for tests.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// The provider name (e.g., "csv", "in_memory").
    fn name(&self) -> &str;

    /// Market rows exactly matching the key. Empty when there is no match.
    async fn market_rows(
        &self,
        job_title: &str,
        location: &str,
    ) -> std::result::Result<Vec<MarketRow>, LookupError>;

    /// Parity rows exactly matching the key. Empty when there is no match.
    async fn parity_rows(
        &self,
        job_title: &str,
        location: &str,
    ) -> std::result::Result<Vec<ParityRow>, LookupError>;

    /// Known titles and their families.
    async fn catalog(&self) -> std::result::Result<Catalog, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matching_ignores_case_and_whitespace() {
        let key = LookupKey::new("Software Engineer", Location::Sea);
        assert!(key.matches("  software engineer ", Location::Sea));
        assert!(!key.matches("Software Engineer", Location::Lax));
        assert!(!key.matches("Senior Software Engineer", Location::Sea));
    }

    #[test]
    fn cache_freshness_follows_key() {
        let cache = CachedLookup {
            key: LookupKey::new("Data Scientist", Location::Dub),
            market: None,
            parity: vec![],
            fetched_at: Utc::now(),
        };
        assert!(cache.is_fresh_for("DATA SCIENTIST", Location::Dub));
        assert!(!cache.is_fresh_for("Data Scientist", Location::Syd));
    }

    #[test]
    fn catalog_canonicalizes_titles() {
        let mut catalog = Catalog {
            titles: vec!["Software Engineer".into(), "Account Executive".into()],
            ..Default::default()
        };
        catalog
            .families
            .insert("account executive".into(), JobFamily::Sales);

        assert_eq!(
            catalog.canonical_title("software ENGINEER"),
            Some("Software Engineer")
        );
        assert_eq!(catalog.canonical_title("Chef"), None);
        assert_eq!(catalog.family_for("Account Executive"), Some(JobFamily::Sales));
    }

    #[test]
    fn source_names_are_literal_file_names() {
        assert_eq!(LookupTable::Market.source_name(), "CompRanges.csv");
        assert_eq!(LookupTable::Parity.source_name(), "EmployeeRoster.csv");
    }
}
