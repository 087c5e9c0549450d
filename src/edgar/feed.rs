use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::sync::Arc;
use url::Url;

use super::discovery::{dedup_by_accession, window_range, DiscoverySource};
use super::parsing::decode_markup;
use super::report::ReportType;
use crate::core::types::{Classification, FilingReference};
use crate::fetch::Fetcher;

pub const FEED_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar";
pub const PAGE_SIZE: usize = 100;
pub const MAX_PAGES: usize = 10;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

pub fn feed_url(form: &ReportType, since: NaiveDate, start: usize, count: usize) -> Result<Url> {
    Url::parse_with_params(
        FEED_URL,
        &[
            ("action", "getcurrent".to_string()),
            ("type", form.to_string()),
            ("datea", since.format("%Y%m%d").to_string()),
            ("start", start.to_string()),
            ("count", count.to_string()),
            ("output", "atom".to_string()),
        ],
    )
    .context("building feed url")
}

/// Decides whether an entry is `form`.
///
/// The declared category must equal the form exactly. Entries that declare
/// no category at all fall back to the title prefix the registry writes
/// (`"4 - Name (id) (Role)"`), at lower trust.
fn classify(entry: &AtomEntry, form: &ReportType) -> Option<Classification> {
    let terms: Vec<&str> = entry
        .categories
        .iter()
        .filter_map(|c| c.term.as_deref())
        .collect();

    if !terms.is_empty() {
        return terms
            .iter()
            .any(|term| form.matches(term))
            .then_some(Classification::Exact);
    }

    let prefix = format!("{} - ", form);
    entry
        .title
        .as_deref()
        .filter(|title| title.trim_start().starts_with(&prefix))
        .map(|_| Classification::Heuristic)
}

/// Parses one feed page. Returns the number of entries on the page and the
/// references among them that are `form` and were updated within `window`.
pub fn parse_feed_page(
    xml: &str,
    form: &ReportType,
    window: &RangeInclusive<NaiveDate>,
) -> Result<(usize, Vec<FilingReference>)> {
    let feed: AtomFeed = from_str(xml).context("parsing atom feed")?;
    let total = feed.entries.len();

    let references = feed
        .entries
        .iter()
        .filter_map(|entry| {
            let classification = classify(entry, form)?;
            let link = entry.links.iter().find_map(|l| l.href.clone())?;

            let updated = entry
                .updated
                .as_deref()
                .and_then(|u| DateTime::parse_from_rfc3339(u.trim()).ok())
                .map(|dt| dt.date_naive());
            if matches!(updated, Some(day) if !window.contains(&day)) {
                return None;
            }

            if classification == Classification::Heuristic {
                log::info!(
                    "Accepting feed entry by title only: {}",
                    entry.title.as_deref().unwrap_or_default()
                );
            }

            Some(
                FilingReference::new(link.clone(), form.to_string())
                    .with_index_url(link)
                    .with_classification(classification),
            )
        })
        .collect();

    Ok((total, references))
}

/// Discovery through the registry's current-filings Atom feed.
pub struct FeedSource {
    fetcher: Arc<Fetcher>,
    form: ReportType,
    page_size: usize,
    max_pages: usize,
}

impl FeedSource {
    pub fn new(fetcher: Arc<Fetcher>, form: ReportType) -> Self {
        Self {
            fetcher,
            form,
            page_size: PAGE_SIZE,
            max_pages: MAX_PAGES,
        }
    }

    pub fn with_paging(mut self, page_size: usize, max_pages: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    async fn page(&self, window: &RangeInclusive<NaiveDate>, start: usize) -> Result<(usize, Vec<FilingReference>)> {
        let url = feed_url(&self.form, *window.start(), start, self.page_size)?;
        let bytes = self.fetcher.get_bytes(&url, &[]).await?;
        parse_feed_page(&decode_markup(&bytes), &self.form, window)
    }
}

#[async_trait]
impl DiscoverySource for FeedSource {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn discover_until(&self, window_days: u32, end: NaiveDate) -> Vec<FilingReference> {
        let window = window_range(window_days, end);
        let mut references = Vec::new();

        for page in 0..self.max_pages {
            let start = page * self.page_size;
            match self.page(&window, start).await {
                Ok((total, found)) => {
                    log::info!("Feed page at {}: {} entries, {} kept", start, total, found.len());
                    references.extend(found);
                    if total < self.page_size {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Stopping feed paging at {}: {:#}", start, e);
                    break;
                }
            }
        }

        dedup_by_accession(references)
    }
}
