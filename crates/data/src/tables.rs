//! Loaded table contents and the exact-match rules over them.

use compagent_core::candidate::JobFamily;
use compagent_core::lookup::{Catalog, MarketRow, ParityRow, titles_equal};
use std::collections::BTreeMap;

/// Both tables, fully loaded.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub market: Vec<MarketRow>,
    pub parity: Vec<ParityRow>,
}

impl Tables {
    pub fn new(market: Vec<MarketRow>, parity: Vec<ParityRow>) -> Self {
        Self { market, parity }
    }

    /// Market rows for a key. Location codes compare case-insensitively.
    pub fn market_rows(&self, job_title: &str, location: &str) -> Vec<MarketRow> {
        self.market
            .iter()
            .filter(|row| {
                titles_equal(&row.job_title, job_title) && locations_equal(&row.location, location)
            })
            .cloned()
            .collect()
    }

    /// Parity rows for a key.
    pub fn parity_rows(&self, job_title: &str, location: &str) -> Vec<ParityRow> {
        self.parity
            .iter()
            .filter(|row| {
                titles_equal(&row.job_title, job_title) && locations_equal(&row.location, location)
            })
            .cloned()
            .collect()
    }

    /// Distinct market titles, sorted, and the roster's title to family map.
    ///
    /// Roster families that are not a known [`JobFamily`] are ignored.
    pub fn catalog(&self) -> Catalog {
        let mut titles: Vec<String> = Vec::new();
        for row in &self.market {
            let title = row.job_title.trim();
            if !titles.iter().any(|known| titles_equal(known, title)) {
                titles.push(title.to_string());
            }
        }
        titles.sort();

        let mut families = BTreeMap::new();
        for row in &self.parity {
            let Some(family) = row.job_family.as_deref() else {
                continue;
            };
            if let Ok(family) = family.parse::<JobFamily>() {
                families.insert(row.job_title.trim().to_lowercase(), family);
            }
        }

        Catalog { titles, families }
    }
}

fn locations_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Parse a compensation cell such as `$123,456`, `€98,000.50` or `120000`.
///
/// Currency symbols, thousands separators and whitespace are ignored.
/// Returns `None` for empty, non-numeric, or non-positive values.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}
