//! Calendar pagination.
//!
//! The match calendar is served as a "load more" feed. Each page reports the
//! index of its last row; the next page starts right after it. Pages are
//! strictly sequential.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::cache::{self, BlobStore, CacheCategory};
use super::http::{Fetcher, RequestOptions};
use super::parsers::{CalendarParser, PageFetchResult};
use super::{calendar_feed_url, calendar_referer};
use crate::types::MatchSummary;

/// Walks the calendar feed for one postal code at a time
pub struct CalendarPaginator {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn BlobStore>,
    base_url: String,
    page_delay: Duration,
}

impl CalendarPaginator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn BlobStore>,
        base_url: impl Into<String>,
        page_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            base_url: base_url.into(),
            page_delay,
        }
    }

    /// Fetch one feed page, through the cache.
    ///
    /// An unreachable page or a body that isn't valid JSON comes back as the
    /// terminal page.
    pub fn fetch_page(&self, plz: &str, from: &str, to: &str, offset: i64, max: usize) -> PageFetchResult {
        let key = format!("{}_{}_{}_{}_{}.json", plz, from, to, offset, max);

        if let Some(cached) = cache::get_text(self.store.as_ref(), CacheCategory::Calendar, &key) {
            match CalendarParser::parse_page(&cached) {
                Ok(page) => return page,
                Err(e) => debug!("Ignoring unreadable cached page {}: {}", key, e),
            }
        }

        let url = calendar_feed_url(&self.base_url, plz, from, to, offset, max);
        let referer = calendar_referer(&self.base_url, plz, from, to);
        let Some(body) = self.fetcher.fetch_text(&url, &RequestOptions::calendar_feed(referer)) else {
            debug!("No calendar page at offset {} for {}", offset, plz);
            return PageFetchResult::terminal(offset);
        };

        match CalendarParser::parse_page(&body) {
            Ok(page) => {
                cache::put_quietly(self.store.as_ref(), CacheCategory::Calendar, &key, body.as_bytes());
                page
            }
            Err(e) => {
                debug!("Calendar page at offset {} is not JSON: {}", offset, e);
                PageFetchResult::terminal(offset)
            }
        }
    }

    /// Lazily yield every match of the feed, starting from offset 0.
    ///
    /// Stops on an empty page, a page flagged final, or a page repeating the
    /// previous page's last index.
    pub fn iter(&self, plz: &str, from: &str, to: &str, page_size: usize) -> CalendarMatches<'_> {
        CalendarMatches {
            paginator: self,
            plz: plz.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            page_size,
            offset: 0,
            last_seen: -1,
            pages: 0,
            pending: VecDeque::new(),
            done: false,
        }
    }
}

/// Iterator returned by [`CalendarPaginator::iter`]
pub struct CalendarMatches<'a> {
    paginator: &'a CalendarPaginator,
    plz: String,
    from: String,
    to: String,
    page_size: usize,
    offset: i64,
    last_seen: i64,
    pages: usize,
    pending: VecDeque<MatchSummary>,
    done: bool,
}

impl CalendarMatches<'_> {
    fn load_next_page(&mut self) {
        if self.pages > 0 && !self.paginator.page_delay.is_zero() {
            thread::sleep(self.paginator.page_delay);
        }

        let page = self
            .paginator
            .fetch_page(&self.plz, &self.from, &self.to, self.offset, self.page_size);
        self.pages += 1;

        if page.html.trim().is_empty() {
            self.done = true;
            return;
        }

        let matches = CalendarParser::parse(&page.html);
        debug!(
            "Calendar {} offset {}: {} matches, lastIndex {}",
            self.plz,
            self.offset,
            matches.len(),
            page.last_index
        );
        self.pending.extend(matches);

        if page.is_final || page.last_index == self.last_seen {
            self.done = true;
            return;
        }
        let Some(next) = page.last_index.checked_add(1) else {
            self.done = true;
            return;
        };
        self.last_seen = page.last_index;
        self.offset = next;
    }
}

impl Iterator for CalendarMatches<'_> {
    type Item = MatchSummary;

    fn next(&mut self) -> Option<MatchSummary> {
        loop {
            if let Some(summary) = self.pending.pop_front() {
                return Some(summary);
            }
            if self.done {
                return None;
            }
            self.load_next_page();
        }
    }
}

/// Collect the calendars of several postal codes, one after another
pub fn collect_matches(
    paginator: &CalendarPaginator,
    plzs: &[String],
    from: &str,
    to: &str,
    page_size: usize,
) -> Vec<MatchSummary> {
    let mut all = Vec::new();
    for plz in plzs {
        let before = all.len();
        all.extend(paginator.iter(plz, from, to, page_size));
        info!("Collected {} matches for {}", all.len() - before, plz);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::cache::{FileCache, NoCache};
    use crate::scraper::http::testing::MockFetcher;
    use crate::scraper::BASE_URL;

    const FROM: &str = "2024-05-18";
    const TO: &str = "2024-05-19";

    fn row(home: &str, game_id: &str) -> String {
        format!(
            r#"<tr><td>15:00</td><td>Herren</td><td>Kreisliga</td><td class="column-club">{}</td><td class="column-club">Gast</td><td><a href="/spiel/x/-/spiel/{}">Spiel</a></td></tr>"#,
            home, game_id
        )
    }

    fn page(rows: &[String], is_final: bool, last_index: i64) -> String {
        serde_json::json!({
            "html": rows.concat(),
            "final": is_final,
            "lastIndex": last_index,
        })
        .to_string()
    }

    fn url(plz: &str, offset: i64) -> String {
        calendar_feed_url(BASE_URL, plz, FROM, TO, offset, 2)
    }

    fn paginator(fetcher: Arc<MockFetcher>, store: Arc<dyn BlobStore>) -> CalendarPaginator {
        CalendarPaginator::new(fetcher, store, BASE_URL, Duration::ZERO)
    }

    #[test]
    fn test_final_first_page() {
        let fetcher = Arc::new(MockFetcher::new().with_text(
            &url("20095", 0),
            &page(&[row("A", "01"), row("B", "02")], true, 1),
        ));
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        let matches: Vec<_> = paginator.iter("20095", FROM, TO, 2).collect();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].home, "A");
        assert_eq!(matches[1].game_id.as_deref(), Some("02"));
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_follows_last_index() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_text(&url("20095", 0), &page(&[row("A", "01"), row("B", "02")], false, 1))
                .with_text(&url("20095", 2), &page(&[row("C", "03")], true, 2)),
        );
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        let homes: Vec<_> = paginator.iter("20095", FROM, TO, 2).map(|m| m.home).collect();
        assert_eq!(homes, vec!["A", "B", "C"]);
        assert_eq!(fetcher.requested_urls(), vec![url("20095", 0), url("20095", 2)]);

        let options = fetcher.requests.lock().unwrap()[0].1.clone();
        assert!(options.xhr);
        assert_eq!(
            options.referer.as_deref(),
            Some(calendar_referer(BASE_URL, "20095", FROM, TO).as_str())
        );
    }

    #[test]
    fn test_stall_guard() {
        let stalled = page(&[row("A", "01")], false, 1);
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_text(&url("20095", 0), &stalled)
                .with_text(&url("20095", 2), &stalled),
        );
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        let matches: Vec<_> = paginator.iter("20095", FROM, TO, 2).collect();
        assert_eq!(matches.len(), 2);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[test]
    fn test_empty_html_stops() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_text(&url("20095", 0), &page(&[row("A", "01")], false, 0))
                .with_text(&url("20095", 1), &page(&[], false, 5)),
        );
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        assert_eq!(paginator.iter("20095", FROM, TO, 2).count(), 1);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[test]
    fn test_unreachable_or_invalid_page_is_terminal() {
        let fetcher = Arc::new(MockFetcher::new().with_text(&url("20097", 0), "<html>Fehler</html>"));
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        assert_eq!(
            paginator.fetch_page("20095", FROM, TO, 0, 2),
            PageFetchResult::terminal(0)
        );
        assert_eq!(
            paginator.fetch_page("20097", FROM, TO, 0, 2),
            PageFetchResult::terminal(0)
        );
        assert_eq!(paginator.iter("20097", FROM, TO, 2).count(), 0);
    }

    #[test]
    fn test_last_index_at_limit_ends_feed() {
        let fetcher = Arc::new(MockFetcher::new().with_text(&url("20095", 0), &page(&[row("A", "01")], false, i64::MAX)));
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        assert_eq!(paginator.iter("20095", FROM, TO, 2).count(), 1);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_iteration_is_lazy() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_text(&url("20095", 0), &page(&[row("A", "01"), row("B", "02")], false, 1))
                .with_text(&url("20095", 2), &page(&[row("C", "03")], true, 2)),
        );
        let paginator = paginator(fetcher.clone(), Arc::new(NoCache));

        let first = paginator.iter("20095", FROM, TO, 2).next();
        assert_eq!(first.map(|m| m.home).as_deref(), Some("A"));
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_pages_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FileCache::new(dir.path()));
        let fetcher = Arc::new(MockFetcher::new().with_text(&url("20095", 0), &page(&[row("A", "01")], true, 0)));

        let first: Vec<_> = paginator(fetcher.clone(), store.clone()).iter("20095", FROM, TO, 2).collect();
        assert!(store.exists(CacheCategory::Calendar, &format!("20095_{}_{}_0_2.json", FROM, TO)));

        let second: Vec<_> = paginator(fetcher.clone(), store).iter("20095", FROM, TO, 2).collect();
        assert_eq!(first, second);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_collect_matches_over_postal_codes() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_text(&url("20095", 0), &page(&[row("A", "01")], true, 0))
                .with_text(&url("20097", 0), &page(&[row("B", "02"), row("C", "03")], true, 1)),
        );
        let paginator = paginator(fetcher, Arc::new(NoCache));

        let plzs = vec!["20095".to_string(), "20097".to_string()];
        let homes: Vec<_> = collect_matches(&paginator, &plzs, FROM, TO, 2)
            .into_iter()
            .map(|m| m.home)
            .collect();
        assert_eq!(homes, vec!["A", "B", "C"]);
    }
}
