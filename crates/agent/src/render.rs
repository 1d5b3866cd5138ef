//! User-facing text built from engine numbers. Amounts in responses come
//! from here, never from completion output.

use compagent_core::candidate::CompleteFields;
use compagent_core::recommendation::{GuardrailFlag, Recommendation};

/// Currency amount with thousands separators, e.g. `$171,000` or `EUR 98,500.50`.
pub fn money(amount: f64, currency: &str) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if frac != 0 {
        grouped.push_str(&format!(".{frac:02}"));
    }

    let sign = if negative { "-" } else { "" };
    match currency {
        "USD" | "" => format!("{sign}${grouped}"),
        other => format!("{sign}{other} {grouped}"),
    }
}

/// The response shown for a recommendation.
pub fn recommendation_text(fields: &CompleteFields, rec: &Recommendation) -> String {
    let c = rec.currency.as_str();
    let mut text = format!(
        "For {}, I recommend a total compensation of {} consisting of:\n\
         - Base Salary: {} ({:.0}th percentile of the market range {} to {} per {})\n\
         - Bonus: {} ({:.0}% for {} level)\n\
         - Equity: {}\n\n\
         This reflects the {} interview feedback for a {} {} role in {}.",
        fields.candidate_id,
        money(rec.total_compensation, c),
        money(rec.base_salary, c),
        rec.base_salary_percentile,
        money(rec.market_range.min, c),
        money(rec.market_range.max, c),
        rec.market_range.source,
        money(rec.bonus_amount, c),
        rec.bonus_percentage,
        fields.job_level,
        money(rec.equity_amount, c),
        fields.interview_feedback,
        fields.job_level,
        fields.job_title,
        fields.location.city(),
    );

    if let Some(parity) = &rec.internal_parity {
        text.push_str(&format!(
            " Internal parity: {} employee(s) between {} and {} per {}.",
            parity.count,
            money(parity.min, c),
            money(parity.max, c),
            parity.source
        ));
    }

    if let Some(counter) = rec.counter_offer {
        if rec.has_flag(GuardrailFlag::CounterOfferExceedsMax) {
            text.push_str(&format!(
                "\n\n**Counter Offer Analysis:** The candidate's counter offer of {} exceeds the top of \
                 the approved market range ({}). The base is capped at the maximum and equity was \
                 increased. Exceeding market guidelines needs VP approval; otherwise consider a signing \
                 bonus, extra PTO, remote flexibility or an accelerated review to bridge the gap.",
                money(counter, c),
                money(rec.market_range.max, c)
            ));
        } else {
            text.push_str(&format!(
                " This recommendation addresses the counter offer of {}.",
                money(counter, c)
            ));
        }
    }

    let notes: Vec<&str> = rec
        .guardrail_flags
        .iter()
        .filter(|f| **f != GuardrailFlag::CounterOfferExceedsMax)
        .map(|f| flag_note(*f))
        .collect();
    if !notes.is_empty() {
        text.push_str("\n\n");
        text.push_str(&notes.join("\n"));
    }
    if let Some(report) = rec.validation.as_ref().filter(|r| !r.passed) {
        text.push_str(&format!("\nValidation problems: {}", report.problems.join("; ")));
    }
    if rec.needs_review() {
        text.push_str("\n\nStatus: **needs review** before this offer is extended.");
    }
    text
}

fn flag_note(flag: GuardrailFlag) -> &'static str {
    match flag {
        GuardrailFlag::CounterOfferExceedsMax => "Counter offer exceeds the market maximum.",
        GuardrailFlag::ParityBelowRecommendation => {
            "Note: every comparable internal employee earns less than this base."
        }
        GuardrailFlag::InsufficientIncreaseOverCurrent => {
            "Note: this base is not a meaningful increase over the candidate's current salary."
        }
        GuardrailFlag::ValidationFailed => {
            "Note: automatic validation found inconsistencies in this recommendation."
        }
    }
}
