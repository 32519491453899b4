//! CLI commands for fussball-api.
//!
//! Lists the match calendar of one or more postal codes and reads single
//! match pages.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use tracing::info;

use crate::config::AppConfig;
use crate::scraper::{
    collect_matches, BlobStore, CalendarPaginator, Fetcher, FileCache, HttpFetcher, MapBuilder,
    MatchDetailExtractor, NoCache, ObfuscationCache, RateLimiter, TtfGlyphReader,
};
use crate::types::{MatchDetail, MatchSummary};

#[derive(Parser)]
#[command(name = "fussball-api")]
#[command(version, about = "fussball.de match calendar and match page scraper", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the matches of a date range
    Matches {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Postal codes, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        plz: Vec<String>,

        /// Rows per feed page
        #[arg(long)]
        page_size: Option<usize>,

        /// Read every match page and print full match details
        #[arg(long)]
        details: bool,

        /// Bypass the on-disk cache
        #[arg(long)]
        no_cache: bool,

        /// Output format (json, table)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Read one match page
    Match {
        /// Match link, absolute or relative to the site
        #[arg(value_name = "LINK")]
        link: String,

        /// Bypass the on-disk cache
        #[arg(long)]
        no_cache: bool,
    },
}

/// Scraper components wired from configuration.
///
/// Holds the blocking HTTP client, so it has to be built and dropped off the
/// async worker threads.
pub struct Services {
    pub paginator: CalendarPaginator,
    pub extractor: MatchDetailExtractor,
}

impl Services {
    pub fn build(config: &AppConfig, use_cache: bool) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            HttpFetcher::new(config.http.timeout(), &config.http.user_agent, config.http.max_retries)
                .context("Failed to build HTTP client")?,
        );
        let store: Arc<dyn BlobStore> = if use_cache {
            Arc::new(FileCache::new(&config.cache.dir))
        } else {
            Arc::new(NoCache)
        };
        let base_url = config.site.base_url.as_str();

        let maps = MapBuilder::new(
            fetcher.clone(),
            store.clone(),
            Arc::new(ObfuscationCache::new()),
            Some(Arc::new(TtfGlyphReader)),
            base_url,
        );

        Ok(Self {
            paginator: CalendarPaginator::new(fetcher.clone(), store.clone(), base_url, config.scraper.page_delay()),
            extractor: MatchDetailExtractor::new(fetcher, store, maps, base_url),
        })
    }
}

/// Run `matches`: walk the calendar, optionally enrich every match.
pub async fn run_matches(
    from: NaiveDate,
    to: NaiveDate,
    plz: Vec<String>,
    page_size: Option<usize>,
    details: bool,
    no_cache: bool,
    format: String,
) -> anyhow::Result<()> {
    if from > to {
        bail!("--from {} is after --to {}", from, to);
    }
    let plzs: Vec<String> = plz
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if plzs.is_empty() {
        bail!("No postal code given");
    }

    let config = AppConfig::load()?;
    let use_cache = config.cache.enabled && !no_cache;
    let page_size = page_size.unwrap_or(config.scraper.page_size).max(1);
    let from = from.format("%Y-%m-%d").to_string();
    let to = to.format("%Y-%m-%d").to_string();

    let build_config = config.clone();
    let services = Arc::new(tokio::task::spawn_blocking(move || Services::build(&build_config, use_cache)).await??);

    info!("Collecting matches {} .. {} for {}", from, to, plzs.join(","));
    let calendar = services.clone();
    let summaries =
        tokio::task::spawn_blocking(move || collect_matches(&calendar.paginator, &plzs, &from, &to, page_size)).await?;
    info!("{} matches found", summaries.len());

    let result = if details {
        let details = enrich(&services, summaries, &config).await;
        details.and_then(|details| print_details(&details, &format))
    } else {
        print_summaries(&summaries, &format)
    };

    tokio::task::spawn_blocking(move || drop(services)).await?;
    result
}

/// Fetch the match page of every summary with a link, a bounded number at a
/// time, in calendar order.
async fn enrich(
    services: &Arc<Services>,
    summaries: Vec<MatchSummary>,
    config: &AppConfig,
) -> anyhow::Result<Vec<MatchDetail>> {
    let limiter = RateLimiter::with_interval(config.scraper.detail_delay());
    let concurrency = config.scraper.detail_concurrency.max(1);
    let pages = summaries.iter().filter(|s| !s.link.is_empty()).count();
    info!("Reading {} match pages, {} at a time", pages, concurrency);

    let results: Vec<_> = stream::iter(summaries)
        .map(|summary| {
            let services = services.clone();
            let limiter = limiter.clone();
            async move {
                if summary.link.is_empty() {
                    return Ok::<_, tokio::task::JoinError>(MatchDetail::from(&summary));
                }
                limiter.acquire().await;
                tokio::task::spawn_blocking(move || {
                    let mut detail = services.extractor.fetch(&summary.link);
                    detail.fill_from_summary(&summary);
                    detail
                })
                .await
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    Ok(results.into_iter().collect::<Result<Vec<_>, _>>()?)
}

/// Run `match`: print one match page's details.
pub async fn run_match(link: String, no_cache: bool) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let use_cache = config.cache.enabled && !no_cache;

    let detail = tokio::task::spawn_blocking(move || -> anyhow::Result<MatchDetail> {
        let services = Services::build(&config, use_cache)?;
        Ok(services.extractor.fetch(&link))
    })
    .await??;

    if detail.is_empty() {
        bail!("match not found or unreadable");
    }
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

fn print_summaries(summaries: &[MatchSummary], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(summaries)?),
        "table" => print_summary_table(summaries),
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(summaries)?);
        }
    }
    Ok(())
}

fn print_details(details: &[MatchDetail], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(details)?),
        "table" => print_detail_table(details),
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(details)?);
        }
    }
    Ok(())
}

/// Print match summaries in table format.
fn print_summary_table(summaries: &[MatchSummary]) {
    println!("=== {} Matches ===", summaries.len());
    for m in summaries {
        println!(
            "  {:<10} {:<5} {:<28} {} - {} {}",
            m.schedule.date_label.as_deref().unwrap_or(""),
            m.schedule.time.as_deref().unwrap_or(""),
            truncate(&m.league, 28),
            m.home,
            m.away,
            m.score.as_deref().unwrap_or("")
        );
    }
}

/// Print match details in table format.
fn print_detail_table(details: &[MatchDetail]) {
    println!("=== {} Matches ===", details.len());
    for d in details {
        println!(
            "  {:<10} {:<5} {:<28} {} - {} {}",
            d.schedule.date_label.as_deref().unwrap_or(""),
            d.schedule.time.as_deref().unwrap_or(""),
            truncate(d.league_label.as_deref().unwrap_or(""), 28),
            d.home.as_deref().unwrap_or("?"),
            d.away.as_deref().unwrap_or("?"),
            d.score.as_deref().unwrap_or("")
        );
        if let Some(venue) = &d.venue {
            println!("             Ort: {}", venue);
        }
        if let Some(referee) = &d.referee {
            println!("             SR:  {}", referee);
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matches_command() {
        let cli = Cli::try_parse_from([
            "fussball-api",
            "matches",
            "--from",
            "2024-05-18",
            "--to",
            "2024-05-19",
            "--plz",
            "20095,20097",
            "--details",
        ])
        .unwrap();

        match cli.command {
            Commands::Matches {
                from,
                plz,
                details,
                no_cache,
                format,
                page_size,
                ..
            } => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 5, 18).unwrap());
                assert_eq!(plz, vec!["20095", "20097"]);
                assert!(details);
                assert!(!no_cache);
                assert_eq!(format, "json");
                assert!(page_size.is_none());
            }
            _ => panic!("expected matches command"),
        }
    }

    #[test]
    fn test_rejects_bad_date() {
        let parsed = Cli::try_parse_from([
            "fussball-api",
            "matches",
            "--from",
            "18.05.2024",
            "--to",
            "2024-05-19",
            "--plz",
            "20095",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_match_command() {
        let cli = Cli::try_parse_from(["fussball-api", "match", "/spiel/a/-/spiel/02X", "--no-cache"]).unwrap();
        match cli.command {
            Commands::Match { link, no_cache } => {
                assert_eq!(link, "/spiel/a/-/spiel/02X");
                assert!(no_cache);
            }
            _ => panic!("expected match command"),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Kreisliga", 28), "Kreisliga");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
