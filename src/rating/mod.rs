//! Performance-rating lookup on minkabu.
//!
//! One browser session is driven through `https://minkabu.jp/stock/<code>`
//! pages, strictly one ticker at a time. The rating is the text of the
//! element right after the `業績評価` label. Lookups never fail the run:
//! every outcome is reported as a [`RatingOutcome`] and turned into an
//! optional column value by [`enrich_all`].

pub mod webdriver;

use crate::config::RatingConfig;
use crate::models::{RatedTicker, TickerCode, TickerRecord};
use crate::utils::Pacer;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use self::webdriver::WebDriverSession;

// ── Browser seam ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("label did not appear within {0:?}")]
    Timeout(Duration),

    #[error("label found but no value element follows it")]
    NoValue,

    #[error("browser command failed: {0}")]
    Command(String),
}

/// A page-rendering browser session.
#[async_trait]
pub trait PageDriver: Send {
    async fn open(&mut self, url: &str) -> Result<(), DriverError>;

    /// Wait up to `timeout` for a `div` whose text contains `label`, then
    /// return the text of the `div` that immediately follows it.
    async fn labeled_sibling_text(
        &mut self,
        label: &str,
        timeout: Duration,
    ) -> Result<String, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

// ── Lookup ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatingOutcome {
    Found(String),
    /// Page rendered but carried no rating (label missing, timed out, blank).
    NotFound,
    TransientError(String),
}

impl RatingOutcome {
    pub fn into_option(self) -> Option<String> {
        match self {
            RatingOutcome::Found(text) => Some(text),
            RatingOutcome::NotFound | RatingOutcome::TransientError(_) => None,
        }
    }
}

pub struct RatingEnricher<D> {
    driver: D,
    base_url: String,
    label: String,
    wait: Duration,
    pacer: Pacer,
}

impl<D: PageDriver> RatingEnricher<D> {
    pub fn new(driver: D, config: &RatingConfig) -> Self {
        Self {
            driver,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            label: config.label.clone(),
            wait: config.wait_timeout(),
            pacer: Pacer::new(config.request_delay()),
        }
    }

    pub fn rating_url(&self, code: &TickerCode) -> String {
        format!("{}/{}", self.base_url, code)
    }

    /// Look up one ticker. Always pauses afterwards, whatever the outcome.
    pub async fn fetch_rating(&mut self, code: &TickerCode) -> RatingOutcome {
        let outcome = self.lookup(code).await;
        self.pacer.pause().await;
        outcome
    }

    async fn lookup(&mut self, code: &TickerCode) -> RatingOutcome {
        let url = self.rating_url(code);
        if let Err(e) = self.driver.open(&url).await {
            return RatingOutcome::TransientError(e.to_string());
        }

        match self.driver.labeled_sibling_text(&self.label, self.wait).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    RatingOutcome::NotFound
                } else {
                    RatingOutcome::Found(text.to_string())
                }
            }
            Err(DriverError::Timeout(_) | DriverError::NoValue) => RatingOutcome::NotFound,
            Err(e) => RatingOutcome::TransientError(e.to_string()),
        }
    }

    /// End the browser session.
    pub async fn close(mut self) -> Result<(), DriverError> {
        self.driver.close().await
    }
}

// ── Enrichment loop ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EnrichReport {
    pub rated: Vec<RatedTicker>,
    pub found: usize,
    pub missing: usize,
    pub errors: usize,
    /// Set when `cancel` fired; unvisited tickers carry no rating.
    pub cancelled: bool,
}

/// Rate every record in order. Per-ticker failures are logged and recorded
/// as `None`; the loop only stops early when `cancel` resolves.
pub async fn enrich_all<D, C>(
    enricher: &mut RatingEnricher<D>,
    records: Vec<TickerRecord>,
    cancel: C,
) -> EnrichReport
where
    D: PageDriver,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let total = records.len();
    let mut report = EnrichReport::default();

    for (i, record) in records.into_iter().enumerate() {
        if report.cancelled {
            report.rated.push(RatedTicker::new(record, None));
            continue;
        }

        info!("[{}/{}] minkabu rating: {}", i + 1, total, record.code);

        let outcome = tokio::select! {
            biased;
            _ = &mut cancel => {
                warn!("Interrupted at {}; remaining tickers left unrated", record.code);
                report.cancelled = true;
                None
            }
            outcome = enricher.fetch_rating(&record.code) => Some(outcome),
        };

        match &outcome {
            Some(RatingOutcome::Found(text)) => {
                info!("  {}: {}", record.code, text);
                report.found += 1;
            }
            Some(RatingOutcome::NotFound) => {
                info!("  {}: no rating", record.code);
                report.missing += 1;
            }
            Some(RatingOutcome::TransientError(e)) => {
                warn!("  {}: rating lookup failed: {}", record.code, e);
                report.errors += 1;
            }
            None => {}
        }

        let rating = outcome.and_then(RatingOutcome::into_option);
        report.rated.push(RatedTicker::new(record, rating));
    }

    report
}
