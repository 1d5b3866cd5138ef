//! Validator: reconciles a recommendation with the rows it claims to use.
//!
//! Deterministic; every check recomputes a figure from the rows and the
//! documented formulas and reports any mismatch as a problem.

use compagent_core::lookup::{CachedLookup, LookupTable};
use compagent_core::recommendation::{
    Citation, GuardrailFlag, InternalParity, MarketRange, Recommendation, ValidationReport,
};

use crate::engine::{
    EngineInput, EnginePolicy, bonus_percentage, default_equity, percentile_of, round_cents,
};

const TOLERANCE: f64 = 0.01;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE
}

pub struct Validator {
    policy: EnginePolicy,
}

impl Validator {
    pub fn new(policy: EnginePolicy) -> Self {
        Self { policy }
    }

    pub fn validate(
        &self,
        rec: &Recommendation,
        lookup: &CachedLookup,
        input: &EngineInput,
    ) -> ValidationReport {
        let mut problems = Vec::new();
        let fields = &input.fields;

        let Some(row) = lookup.market.as_ref() else {
            return ValidationReport::from_problems(vec![
                "no market row was retrieved for this recommendation".into(),
            ]);
        };

        // Sourced figures must match the rows verbatim.
        if rec.market_range != MarketRange::from(row) {
            problems.push(format!(
                "market range {}-{} does not match {} row {}-{}",
                rec.market_range.min,
                rec.market_range.max,
                LookupTable::Market.source_name(),
                row.min,
                row.max
            ));
        }
        if rec.internal_parity != InternalParity::from_rows(&lookup.parity) {
            problems.push("internal parity does not match the retrieved roster rows".into());
        }
        if rec.currency != row.currency {
            problems.push(format!(
                "currency {} differs from market row currency {}",
                rec.currency, row.currency
            ));
        }

        // Base placement.
        if rec.base_salary < row.min - TOLERANCE || rec.base_salary > row.max + TOLERANCE {
            problems.push(format!(
                "base salary {} is outside the market range {}-{}",
                rec.base_salary, row.min, row.max
            ));
        }
        if !close(rec.base_salary_percentile, percentile_of(rec.base_salary, row.min, row.max)) {
            problems.push(format!(
                "percentile {} does not match the base's position in the range",
                rec.base_salary_percentile
            ));
        }

        // Level table and arithmetic.
        let level = fields.job_level;
        if !close(rec.bonus_percentage, bonus_percentage(level)) {
            problems.push(format!(
                "bonus percentage {} is not the {level} default {}",
                rec.bonus_percentage,
                bonus_percentage(level)
            ));
        }
        if !close(rec.bonus_amount, round_cents(rec.base_salary * rec.bonus_percentage / 100.0)) {
            problems.push(format!(
                "bonus amount {} is not {}% of the base",
                rec.bonus_amount, rec.bonus_percentage
            ));
        }
        if !close(
            rec.total_compensation,
            rec.base_salary + rec.bonus_amount + rec.equity_amount,
        ) {
            problems.push(format!(
                "total {} is not base + bonus + equity",
                rec.total_compensation
            ));
        }

        // Placement and counter-offer rules, recomputed from the row.
        let expected = self.policy.place(input, row.min, row.max);
        let expected_base = round_cents(expected.base);
        if !close(rec.base_salary, expected_base) {
            problems.push(format!(
                "base salary {} does not match the expected {expected_base} for {} at {level}",
                rec.base_salary, fields.interview_feedback
            ));
        }
        let expected_equity = round_cents(expected.equity);
        if !close(rec.equity_amount, expected_equity) {
            problems.push(format!(
                "equity {} does not match the expected {expected_equity} ({level} default {} plus boost {})",
                rec.equity_amount,
                default_equity(level),
                expected.boost
            ));
        }
        if rec.has_flag(GuardrailFlag::CounterOfferExceedsMax) != expected.exceeds_max {
            problems.push("counter-offer-exceeds-max flag does not match the counter offer".into());
        }
        if rec.counter_offer != input.counter_offer() {
            problems.push("counter offer does not match the candidate record".into());
        }

        // Citations may only name tables and keys actually used.
        let market_citation = Citation::new(LookupTable::Market, &row.job_title, fields.location.code());
        let parity_citation = Citation::new(LookupTable::Parity, &fields.job_title, fields.location.code());
        for citation in &rec.reasoning.citations {
            let valid = *citation == market_citation
                || (!lookup.parity.is_empty() && *citation == parity_citation);
            if !valid {
                problems.push(format!(
                    "citation '{}: {}' does not match the rows retrieved",
                    citation.source, citation.criteria
                ));
            }
        }
        if !rec.reasoning.citations.contains(&market_citation) {
            problems.push("reasoning does not cite the market row".into());
        }

        ValidationReport::from_problems(problems)
    }
}
