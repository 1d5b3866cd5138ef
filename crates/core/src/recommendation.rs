//! Recommendation output types.
//!
//! Every figure in [`MarketRange`] and [`InternalParity`] is copied from a
//! lookup row; the engine never synthesizes those numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::candidate::{AdditionalContext, CompleteFields};
use crate::lookup::{LookupTable, MarketRow, ParityRow};

/// The market row a recommendation was placed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRange {
    pub job_title: String,
    pub location: String,
    pub currency: String,
    pub min: f64,
    pub max: f64,
    pub source: String,
}

impl From<&MarketRow> for MarketRange {
    fn from(row: &MarketRow) -> Self {
        Self {
            job_title: row.job_title.clone(),
            location: row.location.clone(),
            currency: row.currency.clone(),
            min: row.min,
            max: row.max,
            source: LookupTable::Market.source_name().to_string(),
        }
    }
}

/// Internal employees in the same role and site.
///
/// Only min, max, and count are derived; no percentile or trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalParity {
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub rows: Vec<ParityRow>,
    pub source: String,
}

impl InternalParity {
    /// Summarize matched rows. `None` when nothing matched.
    pub fn from_rows(rows: &[ParityRow]) -> Option<Self> {
        let first = rows.first()?;
        let (min, max) = rows.iter().fold(
            (first.compensation, first.compensation),
            |(lo, hi), row| (lo.min(row.compensation), hi.max(row.compensation)),
        );
        Some(Self {
            min,
            max,
            count: rows.len(),
            rows: rows.to_vec(),
            source: LookupTable::Parity.source_name().to_string(),
        })
    }
}

/// A policy exception that requires human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailFlag {
    /// The counter offer is above the market maximum.
    CounterOfferExceedsMax,
    /// The highest internal salary is below the recommended base.
    ParityBelowRecommendation,
    /// The base is not a meaningful raise over the current salary.
    InsufficientIncreaseOverCurrent,
    /// The validator found problems with the recommendation.
    ValidationFailed,
}

impl GuardrailFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CounterOfferExceedsMax => "counter_offer_exceeds_max",
            Self::ParityBelowRecommendation => "parity_below_recommendation",
            Self::InsufficientIncreaseOverCurrent => "insufficient_increase_over_current",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    #[default]
    Approved,
    NeedsReview,
}

/// A reference to the exact table and row criteria behind a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Literal table name, e.g. `CompRanges.csv`.
    pub source: String,
    /// The match criteria, e.g. `Job Title = Software Engineer; Location = SEA`.
    pub criteria: String,
}

impl Citation {
    pub fn new(table: LookupTable, job_title: &str, location: &str) -> Self {
        Self {
            source: table.source_name().to_string(),
            criteria: format!("Job Title = {job_title}; Location = {location}"),
        }
    }
}

/// Named rationale sections. Any section may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile_justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proficiency_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tradeoffs: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Outcome of the validation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    #[serde(default)]
    pub problems: Vec<String>,
}

impl ValidationReport {
    pub fn from_problems(problems: Vec<String>) -> Self {
        Self {
            passed: problems.is_empty(),
            problems,
        }
    }
}

/// A compensation recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub base_salary: f64,
    /// Position of the base within [market.min, market.max], 0-100.
    pub base_salary_percentile: f64,
    pub bonus_percentage: f64,
    pub bonus_amount: f64,
    pub equity_amount: f64,
    pub total_compensation: f64,
    pub currency: String,
    pub market_range: MarketRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_parity: Option<InternalParity>,
    pub reasoning: Reasoning,
    #[serde(default)]
    pub guardrail_flags: BTreeSet<GuardrailFlag>,
    /// The counter offer this recommendation responded to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_offer: Option<f64>,
    pub status: RecommendationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl Recommendation {
    pub fn has_flag(&self, flag: GuardrailFlag) -> bool {
        self.guardrail_flags.contains(&flag)
    }

    /// Raise a flag; any flag moves the recommendation to review.
    pub fn flag(&mut self, flag: GuardrailFlag) {
        self.guardrail_flags.insert(flag);
        self.status = RecommendationStatus::NeedsReview;
    }

    pub fn needs_review(&self) -> bool {
        self.status == RecommendationStatus::NeedsReview
    }
}

/// A timestamped entry in a candidate's recommendation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSnapshot {
    pub timestamp: DateTime<Utc>,
    pub created_by: String,
    pub fields: CompleteFields,
    #[serde(default)]
    pub additional_context: AdditionalContext,
    pub recommendation: Recommendation,
}
