use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use super::accession::FilingKey;
use crate::fetch::Fetcher;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

const DOCUMENT_EXTENSION: &str = ".xml";

/// Directories that only hold rendering transforms of the real document
/// (`xslF345X05/`, `xslF345X03/`, ...).
fn is_stylesheet_dir(segment: &str) -> bool {
    segment.to_ascii_lowercase().starts_with("xsl")
}

/// Document links found on a filing index page, re-rooted directly under the
/// filing's canonical archive directory.
pub fn scrape_index_links(html: &str, key: &FilingKey) -> Vec<Url> {
    let document = Html::parse_document(html);
    let base = key.archive_dir();

    document
        .select(&ANCHOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| {
            let path = href.split(['?', '#']).next().unwrap_or_default().trim();
            if !path.to_ascii_lowercase().ends_with(DOCUMENT_EXTENSION) {
                return None;
            }

            let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            let filename = segments.pop()?;
            if segments.iter().any(|s| is_stylesheet_dir(s)) {
                return None;
            }

            Url::parse(&format!("{}{}", base, filename)).ok()
        })
        .unique()
        .collect()
}

/// Historically observed document names under the archive directory,
/// most common first.
pub fn pattern_candidates(key: &FilingKey) -> Vec<Url> {
    let base = key.archive_dir();
    let digits = key.accession_digits();
    let names = [
        "primary_doc.xml".to_string(),
        "form4.xml".to_string(),
        format!("{}.xml", key.accession_number()),
        format!("{}.xml", digits),
        format!("wf-form4_{}.xml", digits),
        format!("wk-form4_{}.xml", digits),
    ];

    names
        .iter()
        .filter_map(|name| Url::parse(&format!("{}{}", base, name)).ok())
        .collect()
}

/// Direct hint first, then scraped links, then naming patterns; duplicates
/// keep their earliest position.
pub fn merge_candidates(direct: Option<Url>, scraped: Vec<Url>, patterns: Vec<Url>) -> Vec<Url> {
    direct
        .into_iter()
        .chain(scraped)
        .chain(patterns)
        .unique()
        .collect()
}

/// Candidates known without a network request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownCandidates {
    pub urls: Vec<Url>,
    /// Links from a cached index page are included.
    pub index_scraped: bool,
}

fn index_page_url(key: &FilingKey, index_url: Option<&str>) -> Option<Url> {
    index_url
        .and_then(|raw| Url::parse(raw).ok())
        .or_else(|| Url::parse(&key.index_url()).ok())
}

fn direct_link(key: &FilingKey, direct: Option<&str>) -> Option<Url> {
    direct.and_then(|raw| match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("Ignoring unparsable document link {:?} for {}: {}", raw, key, e);
            None
        }
    })
}

/// The direct hint, links from the index page if it is already cached, and
/// the naming patterns, in candidate order.
pub fn cached_candidates(
    fetcher: &Fetcher,
    key: &FilingKey,
    index_url: Option<&str>,
    direct: Option<&str>,
) -> KnownCandidates {
    let scraped = index_page_url(key, index_url)
        .and_then(|index| fetcher.cached_index_page(&index))
        .map(|html| scrape_index_links(&html, key));

    KnownCandidates {
        index_scraped: scraped.is_some(),
        urls: merge_candidates(
            direct_link(key, direct),
            scraped.unwrap_or_default(),
            pattern_candidates(key),
        ),
    }
}

/// Ordered candidate document URLs for one filing.
///
/// An unreachable index page is not an error here; the naming patterns still
/// apply.
pub async fn candidates(
    fetcher: &Fetcher,
    key: &FilingKey,
    index_url: Option<&str>,
    direct: Option<&str>,
) -> Vec<Url> {
    let scraped = match index_page_url(key, index_url) {
        Some(index) => match fetcher.fetch_index_page(&index).await {
            Ok(html) => scrape_index_links(&html, key),
            Err(e) => {
                log::info!("Index page for {} unavailable ({}); using naming patterns", key, e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let merged = merge_candidates(direct_link(key, direct), scraped, pattern_candidates(key));
    log::debug!("{} candidate url(s) for {}", merged.len(), key);
    merged
}
