//! Recommendation Engine.
//!
//! Given a complete candidate record, decide whether the cached lookup can be
//! reused, fetch fresh rows otherwise, and apply the placement, counter-offer
//! and guardrail rules. [`RecommendationEngine::compute`] is a pure function
//! of its inputs, so the same record and rows always give the same answer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use compagent_config::AgentConfig;
use compagent_core::candidate::{
    AdditionalContext, CandidateContext, CompleteFields, InterviewFeedback, JobLevel, Proficiency,
};
use compagent_core::error::{LookupError, TurnError};
use compagent_core::lookup::{CachedLookup, LookupKey, LookupProvider, LookupTable};
use compagent_core::recommendation::{
    Citation, GuardrailFlag, InternalParity, MarketRange, Reasoning, Recommendation,
    RecommendationStatus,
};
use tracing::{debug, info};

use crate::render::money;

/// Share of the market range the base is placed at, by interview tier.
pub fn placement_target(feedback: InterviewFeedback) -> f64 {
    match feedback {
        InterviewFeedback::MustHire => 0.85,
        InterviewFeedback::StrongHire => 0.75,
        InterviewFeedback::Hire => 0.50,
    }
}

/// Default bonus, as a percentage of base, by level.
pub fn bonus_percentage(level: JobLevel) -> f64 {
    match level {
        JobLevel::P1 => 5.0,
        JobLevel::P2 => 8.0,
        JobLevel::P3 => 10.0,
        JobLevel::P4 => 15.0,
        JobLevel::P5 => 20.0,
    }
}

/// Default equity grant by level.
pub fn default_equity(level: JobLevel) -> f64 {
    match level {
        JobLevel::P1 => 10_000.0,
        JobLevel::P2 => 20_000.0,
        JobLevel::P3 => 30_000.0,
        JobLevel::P4 => 60_000.0,
        JobLevel::P5 => 100_000.0,
    }
}

/// Round to currency precision.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Position of `base` within `[min, max]`, as a percentage with one decimal.
pub fn percentile_of(base: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 50.0;
    }
    let pct = ((base - min) / (max - min) * 100.0).clamp(0.0, 100.0);
    (pct * 10.0).round() / 10.0
}

/// Tunable policy numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct EnginePolicy {
    /// Minimum raise over the current salary, in percent.
    pub meaningful_increase_pct: f64,
    /// Most extra equity granted when a counter offer exceeds market max.
    pub equity_boost_cap: f64,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            meaningful_increase_pct: 10.0,
            equity_boost_cap: 50_000.0,
        }
    }
}

impl From<&AgentConfig> for EnginePolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            meaningful_increase_pct: config.meaningful_increase_pct,
            equity_boost_cap: config.equity_boost_cap,
        }
    }
}

/// Base and equity the placement and counter-offer rules give for a range,
/// before rounding and guardrails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub baseline: f64,
    pub base: f64,
    pub equity: f64,
    /// Extra equity granted for a counter offer above max.
    pub boost: f64,
    pub exceeds_max: bool,
}

impl EnginePolicy {
    /// Place the base in `[min, max]` and apply any counter offer.
    pub fn place(&self, input: &EngineInput, min: f64, max: f64) -> Placement {
        let target = placement_target(input.fields.interview_feedback);
        let baseline = (min + (max - min) * target).round();
        let equity = default_equity(input.fields.job_level);
        let mut placement = Placement {
            baseline,
            base: baseline,
            equity,
            boost: 0.0,
            exceeds_max: false,
        };
        match input.counter_offer() {
            Some(counter) if counter <= max => placement.base = counter.max(baseline),
            Some(counter) => {
                placement.base = max;
                placement.boost = (counter - max).min(self.equity_boost_cap).max(0.0);
                placement.equity += placement.boost;
                placement.exceeds_max = true;
            }
            None => {}
        }
        placement
    }
}

/// How the lookup rows for a turn were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// The cached rows were tagged with the current key.
    Reused,
    /// Nothing was cached.
    Fetched,
    /// The cache was for another title or location and was replaced.
    StaleCacheMismatch,
}

impl CacheDecision {
    pub fn for_cache(cached: Option<&CachedLookup>, fields: &CompleteFields) -> Self {
        match cached {
            Some(c) if c.is_fresh_for(&fields.job_title, fields.location) => Self::Reused,
            Some(_) => Self::StaleCacheMismatch,
            None => Self::Fetched,
        }
    }

    pub fn fetched(&self) -> bool {
        !matches!(self, Self::Reused)
    }
}

/// Everything the rules read from a candidate record.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInput {
    pub fields: CompleteFields,
    pub additional: AdditionalContext,
    pub proficiency: Option<Proficiency>,
}

impl EngineInput {
    pub fn from_context(ctx: &CandidateContext) -> Result<Self, TurnError> {
        let fields = ctx.complete().map_err(TurnError::MissingField)?;
        Ok(Self {
            fields,
            additional: ctx.additional_context.clone(),
            proficiency: ctx.proficiency,
        })
    }

    /// A positive counter offer, if one was recorded.
    pub fn counter_offer(&self) -> Option<f64> {
        self.additional.counter_offer.filter(|c| *c > 0.0)
    }
}

/// A computed recommendation plus the rows it was computed from.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub input: EngineInput,
    pub recommendation: Recommendation,
    pub lookup: CachedLookup,
    pub cache: CacheDecision,
}

pub struct RecommendationEngine {
    lookup: Arc<dyn LookupProvider>,
    policy: EnginePolicy,
    lookup_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(lookup: Arc<dyn LookupProvider>) -> Self {
        Self {
            lookup,
            policy: EnginePolicy::default(),
            lookup_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Recommend for a complete record. Nothing is written; the caller
    /// commits the returned cache and snapshot.
    pub async fn recommend(&self, ctx: &CandidateContext) -> Result<EngineOutcome, TurnError> {
        let input = EngineInput::from_context(ctx)?;
        let (lookup, cache) = self
            .resolve_lookup(&input.fields, ctx.cached_lookup.as_ref())
            .await?;
        let recommendation = self.compute(&input, &lookup)?;
        Ok(EngineOutcome {
            input,
            recommendation,
            lookup,
            cache,
        })
    }

    /// Reuse the cache when its key matches, otherwise query both tables once.
    pub async fn resolve_lookup(
        &self,
        fields: &CompleteFields,
        cached: Option<&CachedLookup>,
    ) -> Result<(CachedLookup, CacheDecision), TurnError> {
        let decision = CacheDecision::for_cache(cached, fields);
        if let (CacheDecision::Reused, Some(cache)) = (decision, cached) {
            debug!(
                candidate_id = %fields.candidate_id,
                job_title = %fields.job_title,
                location = %fields.location,
                "Reusing cached lookup"
            );
            return Ok((cache.clone(), decision));
        }
        if decision == CacheDecision::StaleCacheMismatch {
            debug!(
                candidate_id = %fields.candidate_id,
                job_title = %fields.job_title,
                location = %fields.location,
                "Cached lookup is for another key, refetching"
            );
        }

        let title = fields.job_title.as_str();
        let code = fields.location.code();
        let market = self.bounded(self.lookup.market_rows(title, code)).await?;
        let parity = self.bounded(self.lookup.parity_rows(title, code)).await?;
        info!(
            job_title = %title,
            location = %code,
            market_rows = market.len(),
            parity_rows = parity.len(),
            "Fetched compensation data"
        );

        let lookup = CachedLookup {
            key: LookupKey::new(title, fields.location),
            market: market.into_iter().next(),
            parity,
            fetched_at: Utc::now(),
        };
        Ok((lookup, decision))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, LookupError>>,
    ) -> Result<T, TurnError> {
        match tokio::time::timeout(self.lookup_timeout, call).await {
            Ok(result) => result.map_err(TurnError::from),
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout.as_secs()).into()),
        }
    }

    /// Apply the rules to a set of rows.
    pub fn compute(
        &self,
        input: &EngineInput,
        lookup: &CachedLookup,
    ) -> Result<Recommendation, TurnError> {
        let fields = &input.fields;
        let Some(row) = lookup.market.as_ref() else {
            return Err(TurnError::NoDataFound {
                job_title: fields.job_title.clone(),
                location: fields.location.code().to_string(),
            });
        };
        let market = MarketRange::from(row);
        let (min, max) = (market.min, market.max);
        let currency = market.currency.clone();
        let level = fields.job_level;

        let bonus_pct = bonus_percentage(level);
        let placement = self.policy.place(input, min, max);
        let baseline = placement.baseline;
        let mut flags = Vec::new();
        let mut tradeoffs = Vec::new();

        let counter_offer = input.counter_offer();
        if let Some(counter) = counter_offer {
            if !placement.exceeds_max {
                if counter > baseline {
                    tradeoffs.push(format!(
                        "Base raised from the {} placement of {} to match the counter offer of {}.",
                        fields.interview_feedback,
                        money(baseline, &currency),
                        money(counter, &currency)
                    ));
                } else {
                    tradeoffs.push(format!(
                        "The counter offer of {} is at or below the {} placement, so the base stays at {}.",
                        money(counter, &currency),
                        fields.interview_feedback,
                        money(baseline, &currency)
                    ));
                }
            } else {
                let gap = counter - max;
                flags.push(GuardrailFlag::CounterOfferExceedsMax);
                tradeoffs.push(format!(
                    "The counter offer of {} exceeds the market maximum of {}. Base is capped at the \
                     maximum and {} of extra equity was added; remaining gap {}. Manual review required.",
                    money(counter, &currency),
                    money(max, &currency),
                    money(placement.boost, &currency),
                    money(gap - placement.boost, &currency)
                ));
            }
        }

        let base = round_cents(placement.base);
        let equity = round_cents(placement.equity);
        let bonus_amount = round_cents(base * bonus_pct / 100.0);
        let total = round_cents(base + bonus_amount + equity);
        let percentile = percentile_of(base, min, max);

        if let Some(current) = input.additional.current_salary.filter(|c| *c > 0.0) {
            let increase_pct = (base - current) / current * 100.0;
            if increase_pct < self.policy.meaningful_increase_pct {
                flags.push(GuardrailFlag::InsufficientIncreaseOverCurrent);
                tradeoffs.push(format!(
                    "The base is a {increase_pct:.1}% change over the current salary of {}, below the \
                     {:.0}% minimum for a meaningful increase.",
                    money(current, &currency),
                    self.policy.meaningful_increase_pct
                ));
            } else {
                tradeoffs.push(format!(
                    "The base is a {increase_pct:.1}% increase over the current salary of {}.",
                    money(current, &currency)
                ));
            }
        }

        let parity = InternalParity::from_rows(&lookup.parity);
        if let Some(p) = &parity {
            if p.max < base {
                flags.push(GuardrailFlag::ParityBelowRecommendation);
                tradeoffs.push(format!(
                    "The base is above every comparable internal salary (highest {}); check internal equity before extending.",
                    money(p.max, &currency)
                ));
            }
        }

        let reasoning = self.reasoning(input, &market, parity.as_ref(), base, percentile, equity, tradeoffs);

        let mut recommendation = Recommendation {
            base_salary: base,
            base_salary_percentile: percentile,
            bonus_percentage: bonus_pct,
            bonus_amount,
            equity_amount: equity,
            total_compensation: total,
            currency,
            market_range: market,
            internal_parity: parity,
            reasoning,
            guardrail_flags: Default::default(),
            counter_offer,
            status: RecommendationStatus::Approved,
            validation: None,
        };
        for flag in flags {
            recommendation.flag(flag);
        }

        debug!(
            candidate_id = %fields.candidate_id,
            base = recommendation.base_salary,
            total = recommendation.total_compensation,
            flags = ?recommendation.guardrail_flags,
            "Recommendation computed"
        );
        Ok(recommendation)
    }

    #[allow(clippy::too_many_arguments)]
    fn reasoning(
        &self,
        input: &EngineInput,
        market: &MarketRange,
        parity: Option<&InternalParity>,
        base: f64,
        percentile: f64,
        equity: f64,
        tradeoffs: Vec<String>,
    ) -> Reasoning {
        let fields = &input.fields;
        let currency = market.currency.as_str();
        let level = fields.job_level;
        let location = fields.location.code();

        let mut citations = vec![Citation::new(LookupTable::Market, &market.job_title, location)];
        let parity_analysis = match parity {
            Some(p) => {
                citations.push(Citation::new(LookupTable::Parity, &fields.job_title, location));
                format!(
                    "{} internal employee(s) with this title in {location} earn between {} and {} per {}.",
                    p.count,
                    money(p.min, currency),
                    money(p.max, currency),
                    p.source
                )
            }
            None => format!(
                "No internal employees with this title in {location} were found in {}.",
                LookupTable::Parity.source_name()
            ),
        };

        let equity_justification = if equity > default_equity(level) {
            format!(
                "{} equity: the {level} default of {} plus {} to respond to the counter offer.",
                money(equity, currency),
                money(default_equity(level), currency),
                money(equity - default_equity(level), currency)
            )
        } else {
            format!("{} equity, the default grant for {level}.", money(equity, currency))
        };

        Reasoning {
            market_analysis: Some(format!(
                "{} lists {} in {location} at {} to {}.",
                market.source,
                market.job_title,
                money(market.min, currency),
                money(market.max, currency)
            )),
            parity_analysis: Some(parity_analysis),
            percentile_justification: Some(format!(
                "{} interview feedback targets the {:.0}th percentile; the base of {} sits at the {percentile:.1}th percentile of the range.",
                fields.interview_feedback,
                placement_target(fields.interview_feedback) * 100.0,
                money(base, currency)
            )),
            level_impact: Some(format!(
                "{level} sets a {:.0}% bonus and a default equity grant of {}.",
                bonus_percentage(level),
                money(default_equity(level), currency)
            )),
            family_impact: Some(format!(
                "Job family {} is recorded for context; market ranges are keyed by title and location.",
                fields.job_family
            )),
            proficiency_impact: input.proficiency.map(|p| {
                format!("Proficiency {p} is noted; it does not move placement, which follows interview feedback.")
            }),
            bonus_justification: Some(format!(
                "{:.0}% bonus for {level} per company policy.",
                bonus_percentage(level)
            )),
            equity_justification: Some(equity_justification),
            tradeoffs: (!tradeoffs.is_empty()).then(|| tradeoffs.join(" ")),
            citations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compagent_core::candidate::{JobFamily, Location};
    use compagent_core::lookup::{MarketRow, ParityRow};
    use compagent_data::InMemoryLookup;

    fn fields(feedback: InterviewFeedback, level: JobLevel) -> CompleteFields {
        CompleteFields {
            candidate_id: "CAND-001".into(),
            job_title: "Software Engineer".into(),
            job_level: level,
            location: Location::Sea,
            job_family: JobFamily::Engineering,
            interview_feedback: feedback,
        }
    }

    fn input(feedback: InterviewFeedback) -> EngineInput {
        EngineInput {
            fields: fields(feedback, JobLevel::P3),
            additional: AdditionalContext::default(),
            proficiency: None,
        }
    }

    fn lookup(parity: Vec<ParityRow>) -> CachedLookup {
        CachedLookup {
            key: LookupKey::new("Software Engineer", Location::Sea),
            market: Some(MarketRow {
                job_title: "Software Engineer".into(),
                location: "SEA".into(),
                currency: "USD".into(),
                min: 120_000.0,
                max: 180_000.0,
            }),
            parity,
            fetched_at: Utc::now(),
        }
    }

    fn employee(comp: f64) -> ParityRow {
        ParityRow {
            name: "Alex Kim".into(),
            job_title: "Software Engineer".into(),
            job_family: Some("Engineering".into()),
            proficiency: "Proficient".into(),
            location: "SEA".into(),
            compensation: comp,
        }
    }

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(Arc::new(InMemoryLookup::new()))
    }

    #[test]
    fn placement_follows_interview_tier() {
        let e = engine();
        let must = e.compute(&input(InterviewFeedback::MustHire), &lookup(vec![])).unwrap();
        let strong = e.compute(&input(InterviewFeedback::StrongHire), &lookup(vec![])).unwrap();
        let hire = e.compute(&input(InterviewFeedback::Hire), &lookup(vec![])).unwrap();
        assert_eq!(must.base_salary, 171_000.0);
        assert_eq!(strong.base_salary, 165_000.0);
        assert_eq!(hire.base_salary, 150_000.0);
        assert_eq!(hire.base_salary_percentile, 50.0);
        assert_eq!(must.base_salary_percentile, 85.0);
    }

    #[test]
    fn bonus_equity_and_total() {
        let rec = engine()
            .compute(&input(InterviewFeedback::Hire), &lookup(vec![]))
            .unwrap();
        assert_eq!(rec.bonus_percentage, 10.0);
        assert_eq!(rec.bonus_amount, 15_000.0);
        assert_eq!(rec.equity_amount, 30_000.0);
        assert_eq!(rec.total_compensation, 195_000.0);
        assert_eq!(rec.status, RecommendationStatus::Approved);
        assert!(rec.guardrail_flags.is_empty());
    }

    #[test]
    fn counter_offer_within_range_is_matched() {
        let mut inp = input(InterviewFeedback::Hire);
        inp.additional.counter_offer = Some(150_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert_eq!(rec.base_salary, 150_000.0);
        assert!(!rec.needs_review());

        inp.additional.counter_offer = Some(160_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert_eq!(rec.base_salary, 160_000.0);
    }

    #[test]
    fn counter_offer_below_baseline_keeps_baseline() {
        let mut inp = input(InterviewFeedback::MustHire);
        inp.additional.counter_offer = Some(130_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert_eq!(rec.base_salary, 171_000.0);
    }

    #[test]
    fn counter_offer_above_max_caps_base_and_boosts_equity() {
        let mut inp = input(InterviewFeedback::Hire);
        inp.additional.counter_offer = Some(220_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert_eq!(rec.base_salary, 180_000.0);
        assert!(rec.has_flag(GuardrailFlag::CounterOfferExceedsMax));
        assert!(rec.equity_amount > default_equity(JobLevel::P3));
        assert_eq!(rec.equity_amount, 70_000.0);
        assert!(rec.needs_review());
        assert_eq!(rec.base_salary_percentile, 100.0);
        assert!(rec.reasoning.tradeoffs.unwrap().contains("remaining gap"));
    }

    #[test]
    fn equity_boost_is_capped() {
        let mut inp = input(InterviewFeedback::Hire);
        inp.additional.counter_offer = Some(400_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert_eq!(rec.equity_amount, 30_000.0 + 50_000.0);
    }

    #[test]
    fn small_raise_over_current_salary_is_flagged() {
        let mut inp = input(InterviewFeedback::Hire);
        inp.additional.current_salary = Some(145_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert!(rec.has_flag(GuardrailFlag::InsufficientIncreaseOverCurrent));

        inp.additional.current_salary = Some(120_000.0);
        let rec = engine().compute(&inp, &lookup(vec![])).unwrap();
        assert!(!rec.has_flag(GuardrailFlag::InsufficientIncreaseOverCurrent));
    }

    #[test]
    fn parity_below_base_is_flagged_not_overridden() {
        let rec = engine()
            .compute(
                &input(InterviewFeedback::MustHire),
                &lookup(vec![employee(140_000.0), employee(150_000.0)]),
            )
            .unwrap();
        assert_eq!(rec.base_salary, 171_000.0);
        assert!(rec.has_flag(GuardrailFlag::ParityBelowRecommendation));
        let parity = rec.internal_parity.unwrap();
        assert_eq!((parity.min, parity.max, parity.count), (140_000.0, 150_000.0, 2));
        assert_eq!(rec.reasoning.citations.len(), 2);
    }

    #[test]
    fn no_market_row_is_no_data() {
        let mut l = lookup(vec![]);
        l.market = None;
        let err = engine().compute(&input(InterviewFeedback::Hire), &l).unwrap_err();
        assert!(matches!(err, TurnError::NoDataFound { .. }));
    }

    #[test]
    fn compute_is_deterministic() {
        let mut inp = input(InterviewFeedback::StrongHire);
        inp.additional.counter_offer = Some(200_000.0);
        let l = lookup(vec![employee(150_000.0)]);
        let e = engine();
        assert_eq!(e.compute(&inp, &l).unwrap(), e.compute(&inp, &l).unwrap());
    }

    #[test]
    fn percentile_edge_cases() {
        assert_eq!(percentile_of(100.0, 100.0, 100.0), 50.0);
        assert_eq!(percentile_of(90.0, 100.0, 200.0), 0.0);
        assert_eq!(percentile_of(133.33, 100.0, 200.0), 33.3);
    }

    fn complete_context() -> CandidateContext {
        let mut ctx = CandidateContext::new("CAND-001", "a", Utc::now());
        ctx.job_title = Some("Software Engineer".into());
        ctx.job_level = Some(JobLevel::P3);
        ctx.location = Some(Location::Sea);
        ctx.job_family = Some(JobFamily::Engineering);
        ctx.interview_feedback = Some(InterviewFeedback::Hire);
        ctx
    }

    fn counting_lookup() -> Arc<InMemoryLookup> {
        Arc::new(
            InMemoryLookup::new()
                .with_market("Software Engineer", "SEA", "USD", 120_000.0, 180_000.0)
                .with_market("Software Engineer", "LAX", "USD", 115_000.0, 170_000.0)
                .with_employee("A", "Software Engineer", Some("Engineering"), "Advanced", "SEA", 160_000.0),
        )
    }

    #[tokio::test]
    async fn fresh_cache_skips_lookup() {
        let data = counting_lookup();
        let engine = RecommendationEngine::new(data.clone());
        let mut ctx = complete_context();
        ctx.cached_lookup = Some(lookup(vec![]));

        let out = engine.recommend(&ctx).await.unwrap();
        assert_eq!(out.cache, CacheDecision::Reused);
        assert_eq!(data.market_calls(), 0);
        assert_eq!(data.parity_calls(), 0);
    }

    #[tokio::test]
    async fn stale_cache_fetches_each_table_once() {
        let data = counting_lookup();
        let engine = RecommendationEngine::new(data.clone());
        let mut ctx = complete_context();
        let mut stale = lookup(vec![]);
        stale.key = LookupKey::new("Software Engineer", Location::Lax);
        ctx.cached_lookup = Some(stale);

        let out = engine.recommend(&ctx).await.unwrap();
        assert_eq!(out.cache, CacheDecision::StaleCacheMismatch);
        assert_eq!(data.market_calls(), 1);
        assert_eq!(data.parity_calls(), 1);
        assert!(out.lookup.key.matches("Software Engineer", Location::Sea));
        assert_eq!(out.recommendation.internal_parity.unwrap().count, 1);
    }

    #[tokio::test]
    async fn unknown_title_is_no_data() {
        let data = counting_lookup();
        let engine = RecommendationEngine::new(data.clone());
        let mut ctx = complete_context();
        ctx.job_title = Some("Underwater Basket Weaver".into());
        ctx.location = Some(Location::Lax);

        let err = engine.recommend(&ctx).await.unwrap_err();
        assert!(matches!(err, TurnError::NoDataFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_times_out() {
        let data = Arc::new(
            InMemoryLookup::new()
                .with_market("Software Engineer", "SEA", "USD", 1.0, 2.0)
                .with_delay(Duration::from_secs(30)),
        );
        let engine = RecommendationEngine::new(data).with_lookup_timeout(Duration::from_secs(1));
        let err = engine.recommend(&complete_context()).await.unwrap_err();
        assert!(matches!(err, TurnError::UpstreamUnavailable(_)));
    }
}
