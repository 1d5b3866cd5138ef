//! In-memory lookup provider: for tests and demos.
//!
//! Counts calls per table so cache behavior can be asserted, and can be told
//! to fail or stall to exercise upstream error handling.

use async_trait::async_trait;
use compagent_core::error::LookupError;
use compagent_core::lookup::{Catalog, LookupProvider, MarketRow, ParityRow};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::tables::Tables;

/// Lookup provider over rows held in memory.
#[derive(Default)]
pub struct InMemoryLookup {
    tables: Tables,
    failure: Option<LookupError>,
    delay: Option<Duration>,
    market_calls: AtomicUsize,
    parity_calls: AtomicUsize,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a market row.
    pub fn with_market(
        mut self,
        job_title: &str,
        location: &str,
        currency: &str,
        min: f64,
        max: f64,
    ) -> Self {
        self.tables.market.push(MarketRow {
            job_title: job_title.into(),
            location: location.into(),
            currency: currency.into(),
            min,
            max,
        });
        self
    }

    /// Add an employee row.
    pub fn with_employee(
        mut self,
        name: &str,
        job_title: &str,
        job_family: Option<&str>,
        proficiency: &str,
        location: &str,
        compensation: f64,
    ) -> Self {
        self.tables.parity.push(ParityRow {
            name: name.into(),
            job_title: job_title.into(),
            job_family: job_family.map(String::from),
            proficiency: proficiency.into(),
            location: location.into(),
            compensation,
        });
        self
    }

    /// Every call fails with `error`.
    pub fn failing(mut self, error: LookupError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Every call sleeps for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }

    pub fn parity_calls(&self) -> usize {
        self.parity_calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), LookupError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LookupProvider for InMemoryLookup {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn market_rows(
        &self,
        job_title: &str,
        location: &str,
    ) -> Result<Vec<MarketRow>, LookupError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(self.tables.market_rows(job_title, location))
    }

    async fn parity_rows(
        &self,
        job_title: &str,
        location: &str,
    ) -> Result<Vec<ParityRow>, LookupError> {
        self.parity_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(self.tables.parity_rows(job_title, location))
    }

    async fn catalog(&self) -> Result<Catalog, LookupError> {
        self.gate().await?;
        Ok(self.tables.catalog())
    }
}
