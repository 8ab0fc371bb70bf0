//! Pipeline orchestrator: listing → ratings → CSV (→ Drive).
//!
//! ## Steps
//!
//! 1. Crawl the kabutan 52-week-high listing until an empty page or the page
//!    cap, dedup exact rows.
//! 2. Open one browser session, look up each ticker's minkabu rating in
//!    order, close the session. Lookup failures only blank that ticker's
//!    rating. Ctrl-C stops the loop early; the session is still closed.
//! 3. Write `kabutan_52w_<YYYYMMDD>.csv`, then hand it to the sink. With
//!    [`Sink::LocalFileAndDrive`] an upload failure fails the run, but the
//!    local file is already on disk. Ctrl-C during the upload aborts it with
//!    an error; the local file stays.

use crate::config::AppConfig;
use crate::drive::DriveUploader;
use crate::models::{RatedTicker, TickerCode, TickerRecord};
use crate::rating::{EnrichReport, PageDriver, RatingEnricher, WebDriverSession, enrich_all};
use crate::scraper::{KabutanScraper, ListingSource, collect_listing};
use crate::storage;
use crate::utils::{Pacer, StepTimer};
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where the finished table goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    LocalFile,
    LocalFileAndDrive,
}

impl Sink {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.drive.enabled {
            Sink::LocalFileAndDrive
        } else {
            Sink::LocalFile
        }
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub tickers: usize,
    pub ratings_found: usize,
    pub ratings_missing: usize,
    pub rating_errors: usize,
    pub cancelled: bool,
    pub output: PathBuf,
    pub drive_file_id: Option<String>,
}

pub struct Pipeline {
    config: AppConfig,
    sink: Sink,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let sink = Sink::from_config(&config);
        Self { config, sink }
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    /// Full run against the live sites.
    pub async fn run(&self) -> Result<PipelineStats> {
        let records = {
            let _t = StepTimer::start("Step 1: 52-week-high listing");
            let scraper =
                KabutanScraper::new(&self.config.listing).context("Failed to build scraper")?;
            self.collect(&scraper).await?
        };
        info!("52-week-high tickers: {}", records.len());

        let report = {
            let _t = StepTimer::start("Step 2: minkabu ratings");
            let session = WebDriverSession::connect(&self.config.rating).await?;
            rate_and_close(
                RatingEnricher::new(session, &self.config.rating),
                records,
                shutdown_signal(),
            )
            .await
        };

        let _t = StepTimer::start("Step 3: save");
        self.persist(report, Local::now().date_naive(), shutdown_signal())
            .await
    }

    pub async fn collect(&self, source: &dyn ListingSource) -> Result<Vec<TickerRecord>> {
        collect_listing(
            source,
            self.config.listing.max_pages,
            Pacer::new(self.config.listing.page_delay()),
        )
        .await
        .context("Listing collection failed")
    }

    /// Write the CSV for `date`, then run the sink. The sink step is abandoned
    /// with an error if `cancel` resolves first.
    pub async fn persist<C>(
        &self,
        report: EnrichReport,
        date: NaiveDate,
        cancel: C,
    ) -> Result<PipelineStats>
    where
        C: Future<Output = ()>,
    {
        let output = storage::write_csv(
            &self.config.output.dir,
            &self.config.output.file_prefix,
            date,
            &report.rated,
        )?;

        let drive_file_id = match self.sink {
            Sink::LocalFile => None,
            Sink::LocalFileAndDrive if report.cancelled => {
                warn!("Run was interrupted, skipping Drive upload of a partial file");
                None
            }
            Sink::LocalFileAndDrive => {
                let upload = async {
                    let uploader = DriveUploader::from_env(&self.config.drive)
                        .context("Drive credentials unavailable")?;
                    uploader
                        .upload_csv(&output)
                        .await
                        .with_context(|| format!("Drive upload of {} failed", output.display()))
                };

                let id = tokio::select! {
                    biased;
                    _ = cancel => {
                        bail!("Interrupted during Drive upload; local file kept at {}", output.display())
                    }
                    id = upload => id?,
                };
                Some(id)
            }
        };

        Ok(PipelineStats {
            tickers: report.rated.len(),
            ratings_found: report.found,
            ratings_missing: report.missing,
            rating_errors: report.errors,
            cancelled: report.cancelled,
            output,
            drive_file_id,
        })
    }
}

/// Run the rating loop, then close the session no matter how the loop ended.
pub async fn rate_and_close<D, C>(
    mut enricher: RatingEnricher<D>,
    records: Vec<TickerRecord>,
    cancel: C,
) -> EnrichReport
where
    D: PageDriver,
    C: Future<Output = ()>,
{
    let report = enrich_all(&mut enricher, records, cancel).await;

    if let Err(e) = enricher.close().await {
        warn!("Browser session did not close cleanly: {}", e);
    }

    info!(
        "Ratings: {} found | {} missing | {} errors",
        report.found, report.missing, report.errors
    );
    report
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Bare rows for rating lookups by code only; listing fields are empty.
pub fn code_only(codes: Vec<TickerCode>) -> Vec<TickerRecord> {
    codes
        .into_iter()
        .map(|code| TickerRecord {
            code,
            name: String::new(),
            market: String::new(),
            per: String::new(),
            pbr: String::new(),
        })
        .collect()
}

/// Plain rows for `list`: rating column left empty.
pub fn unrated(records: Vec<TickerRecord>) -> Vec<RatedTicker> {
    records.into_iter().map(|r| RatedTicker::new(r, None)).collect()
}
