mod config;
mod drive;
mod models;
mod pipeline;
mod rating;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::models::TickerCode;
use crate::pipeline::{Pipeline, PipelineStats, Sink};
use crate::rating::{RatingEnricher, WebDriverSession};
use crate::scraper::KabutanScraper;

#[derive(Parser)]
#[command(name = "kabu52w", about = "kabutan 52-week-high list with minkabu ratings", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the listing, rate every ticker, save the dated CSV
    Run {
        /// Also upload the CSV to the configured Drive folder
        #[arg(long)]
        upload: bool,

        /// Override listing.max_pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Override output.dir
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the 52-week-high listing only (no browser, no file)
    List {
        /// Override listing.max_pages
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Look up the minkabu rating of specific tickers
    Rating {
        /// 4-digit ticker codes, e.g. 7203
        #[arg(required = true, value_parser = parse_code)]
        codes: Vec<TickerCode>,
    },
}

fn parse_code(s: &str) -> Result<TickerCode, String> {
    TickerCode::parse(s).map_err(|e| e.to_string())
}

fn saved_line(stats: &PipelineStats) -> String {
    if stats.cancelled {
        format!(
            "Interrupted: partial file saved to {} (unrated tickers left blank, upload skipped)",
            stats.output.display()
        )
    } else {
        format!("Saved: {}", stats.output.display())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "kabu52w=info,warn",
        1 => "kabu52w=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Run { upload, max_pages, output_dir } => {
            if let Some(n) = max_pages {
                config.listing.max_pages = n;
            }
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }

            let mut pipeline = Pipeline::new(config);
            if upload {
                pipeline = pipeline.with_sink(Sink::LocalFileAndDrive);
            }

            let stats = pipeline.run().await?;
            info!(
                "Done: {} tickers | {} rated | {} missing | {} errors",
                stats.tickers, stats.ratings_found, stats.ratings_missing, stats.rating_errors
            );
            println!("52週高値銘柄数: {}", stats.tickers);
            println!("{}", saved_line(&stats));
            if let Some(id) = stats.drive_file_id {
                println!("Drive file id: {}", id);
            }
        }

        Command::List { max_pages } => {
            if let Some(n) = max_pages {
                config.listing.max_pages = n;
            }
            let scraper = KabutanScraper::new(&config.listing)?;
            let records = Pipeline::new(config).collect(&scraper).await?;

            let mut out = std::io::stdout().lock();
            storage::write_records(&mut out, &pipeline::unrated(records))
                .context("Failed to print listing")?;
        }

        Command::Rating { codes } => {
            let session = WebDriverSession::connect(&config.rating).await?;
            let enricher = RatingEnricher::new(session, &config.rating);

            let report = pipeline::rate_and_close(
                enricher,
                pipeline::code_only(codes),
                pipeline::shutdown_signal(),
            )
            .await;

            for rated in &report.rated {
                let rating = rated.performance_rating.as_deref().unwrap_or("-");
                println!("{}\t{}", rated.record.code, rating);
            }
            if report.cancelled {
                println!("Interrupted: remaining codes not looked up");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn stats(cancelled: bool) -> PipelineStats {
        PipelineStats {
            tickers: 3,
            ratings_found: 1,
            ratings_missing: 1,
            rating_errors: 0,
            cancelled,
            output: PathBuf::from("out/kabutan_52w_20260205.csv"),
            drive_file_id: None,
        }
    }

    #[test]
    fn test_interrupted_run_says_so() {
        let line = saved_line(&stats(true));
        assert!(line.starts_with("Interrupted: partial file saved to out"));
        assert!(line.contains("upload skipped"));
        assert_eq!(saved_line(&stats(false)), "Saved: out/kabutan_52w_20260205.csv");
    }

    #[test]
    fn test_every_flag_has_help() {
        let mut cli = Cli::command();
        cli.build();
        for sub in cli.get_subcommands().filter(|s| s.get_name() != "help") {
            for arg in sub.get_arguments() {
                if matches!(arg.get_id().as_str(), "help" | "version") {
                    continue;
                }
                assert!(
                    arg.get_help().is_some(),
                    "{} --{} has no help text",
                    sub.get_name(),
                    arg.get_id()
                );
            }
        }
    }

    #[test]
    fn test_rating_rejects_bad_codes() {
        assert!(Cli::try_parse_from(["kabu52w", "rating", "7203", "6758"]).is_ok());
        assert!(Cli::try_parse_from(["kabu52w", "rating", "72O3"]).is_err());
    }
}
