use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

use super::accession::{resolve, SeenKeys};
use super::api::ApiSource;
use super::feed::FeedSource;
use super::index::BulkIndexSource;
use super::report::ReportType;
use crate::core::config::PipelineConfig;
use crate::core::types::FilingReference;
use crate::fetch::Fetcher;
use crate::utils::dirs;

/// Enumerates filing references for the `window_days` calendar days ending today.
///
/// Failures inside a source (a missing day, an unreachable feed page) are
/// logged and skipped; a source never fails the window as a whole.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Same as [`DiscoverySource::discover`] with an explicit last day.
    async fn discover_until(&self, window_days: u32, end: NaiveDate) -> Vec<FilingReference>;

    async fn discover(&self, window_days: u32) -> Vec<FilingReference> {
        self.discover_until(window_days, Utc::now().date_naive()).await
    }
}

/// The calendar days of a window, oldest first. A zero-day window still covers `end`.
pub fn window_dates(window_days: u32, end: NaiveDate) -> Vec<NaiveDate> {
    let days = i64::from(window_days.max(1));
    (0..days)
        .rev()
        .map(|back| end - Duration::days(back))
        .collect()
}

/// The window as an inclusive date range.
pub fn window_range(window_days: u32, end: NaiveDate) -> RangeInclusive<NaiveDate> {
    let days = i64::from(window_days.max(1));
    (end - Duration::days(days - 1))..=end
}

/// Drops references whose accession number was already seen, keeping the first.
///
/// References that do not resolve are kept so the resolver reports them.
pub fn dedup_by_accession(references: Vec<FilingReference>) -> Vec<FilingReference> {
    let mut seen = SeenKeys::new();
    let before = references.len();
    let kept: Vec<FilingReference> = references
        .into_iter()
        .filter(|r| match resolve(&r.link) {
            Ok(key) => seen.insert(&key),
            Err(_) => true,
        })
        .collect();

    if kept.len() < before {
        log::debug!("Dropped {} duplicate reference(s)", before - kept.len());
    }
    kept
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Feed,
    Index,
    Api,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Feed => write!(f, "feed"),
            Strategy::Index => write!(f, "index"),
            Strategy::Api => write!(f, "api"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "feed" | "atom" => Ok(Strategy::Feed),
            "index" | "daily-index" => Ok(Strategy::Index),
            "api" => Ok(Strategy::Api),
            other => Err(format!("unknown discovery strategy {:?} (feed, index, api)", other)),
        }
    }
}

impl Strategy {
    /// Builds the source for this strategy. Only the API strategy can fail,
    /// when its access key is not configured.
    pub fn build(
        self,
        fetcher: Arc<Fetcher>,
        config: &PipelineConfig,
    ) -> Result<Box<dyn DiscoverySource>> {
        let form = ReportType::Form4;
        Ok(match self {
            Strategy::Feed => Box::new(FeedSource::new(fetcher, form)),
            Strategy::Index => Box::new(
                BulkIndexSource::new(fetcher, form)
                    .with_cache_dir(dirs::daily_index_dir(&config.data_dir)),
            ),
            Strategy::Api => {
                let key = config
                    .require_api_key()
                    .map_err(|e| anyhow!("{} strategy unavailable: {}", self, e))?;
                Box::new(ApiSource::new(fetcher, form, key))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_dates() {
        let end = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let days = window_dates(3, end);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                end,
            ]
        );
        assert_eq!(window_dates(0, end), vec![end]);
    }

    #[test]
    fn test_window_range_matches_dates() {
        let end = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let range = window_range(3, end);
        assert_eq!(*range.start(), window_dates(3, end)[0]);
        assert_eq!(*range.end(), end);
        assert_eq!(window_range(0, end), end..=end);
    }

    #[test]
    fn test_dedup_keeps_first_and_unresolvable() {
        let refs = vec![
            FilingReference::new("https://www.sec.gov/Archives/edgar/data/1000045/0001000045-25-000010.txt", "4"),
            FilingReference::new(
                "https://www.sec.gov/Archives/edgar/data/1000045/000100004525000010/0001000045-25-000010-index.htm",
                "4",
            ),
            FilingReference::new("not a filing", "4"),
            FilingReference::new("https://www.sec.gov/Archives/edgar/data/320193/0000320193-25-000071.txt", "4"),
        ];
        let kept = dedup_by_accession(refs);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].link.ends_with("0001000045-25-000010.txt"));
        assert_eq!(kept[1].link, "not a filing");
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Feed".parse::<Strategy>().unwrap(), Strategy::Feed);
        assert_eq!("daily-index".parse::<Strategy>().unwrap(), Strategy::Index);
        assert!("rss".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Api.to_string(), "api");
    }
}
