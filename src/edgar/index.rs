use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use super::discovery::{dedup_by_accession, window_dates, DiscoverySource};
use super::parsing::decode_markup;
use super::report::ReportType;
use super::EDGAR_BASE_URL;
use crate::core::types::{Classification, FilingReference};
use crate::fetch::cache::write_atomic;
use crate::fetch::Fetcher;

pub const DAILY_INDEX_URL: &str = "https://www.sec.gov/Archives/edgar/daily-index";

/// Marks the column-header row; data rows follow it.
const HEADER_MARKER: &str = "CIK|Company Name";

/// One data row of a daily master index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub issuer_id: String,
    pub company_name: String,
    pub form_type: String,
    pub date_filed: String,
    pub file_path: String,
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

pub fn daily_index_url(date: NaiveDate) -> String {
    format!(
        "{}/{}/QTR{}/master.{}.idx",
        DAILY_INDEX_URL,
        date.year(),
        quarter_of(date),
        date.format("%Y%m%d")
    )
}

fn has_header(text: &str) -> bool {
    text.lines().any(|line| line.trim().starts_with(HEADER_MARKER))
}

/// Parses the pipe-delimited rows following the header marker. Rows without
/// exactly five fields are skipped.
pub fn parse_daily_index(text: &str) -> Vec<IndexRow> {
    let mut lines = text.lines();
    if !lines.any(|line| line.trim().starts_with(HEADER_MARKER)) {
        log::warn!("Daily index has no `{}` header row", HEADER_MARKER);
        return Vec::new();
    }

    lines
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.chars().all(|c| c == '-'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            match fields.as_slice() {
                [issuer_id, company_name, form_type, date_filed, file_path] => Some(IndexRow {
                    issuer_id: issuer_id.to_string(),
                    company_name: company_name.to_string(),
                    form_type: form_type.to_string(),
                    date_filed: date_filed.to_string(),
                    file_path: file_path.to_string(),
                }),
                _ => {
                    log::debug!("Skipping index row with {} field(s): {}", fields.len(), line);
                    None
                }
            }
        })
        .collect()
}

/// References for the rows whose form type equals `form` exactly.
pub fn references_from_rows(rows: &[IndexRow], form: &ReportType) -> Vec<FilingReference> {
    rows.iter()
        .filter(|row| form.matches(&row.form_type))
        .map(|row| {
            FilingReference::new(
                format!("{}/Archives/{}", EDGAR_BASE_URL, row.file_path.trim_start_matches('/')),
                form.to_string(),
            )
            .with_classification(Classification::Exact)
        })
        .collect()
}

/// Discovery through the registry's daily bulk index files.
pub struct BulkIndexSource {
    fetcher: Arc<Fetcher>,
    form: ReportType,
    cache_dir: Option<PathBuf>,
}

impl BulkIndexSource {
    pub fn new(fetcher: Arc<Fetcher>, form: ReportType) -> Self {
        Self {
            fetcher,
            form,
            cache_dir: None,
        }
    }

    /// Keeps completed days' index files under `dir` across runs.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    fn cache_path(&self, date: NaiveDate) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("master.{}.idx", date.format("%Y%m%d"))))
    }

    /// Index text for one day. The current day's file is still growing, so
    /// only earlier days are read from or written to the local cache. A body
    /// without the header row is never cached, and a cached copy without it
    /// is deleted and fetched again.
    pub async fn load_day(&self, date: NaiveDate) -> Result<String> {
        let cacheable = date < Utc::now().date_naive();
        let cache_path = self.cache_path(date).filter(|_| cacheable);

        if let Some(path) = &cache_path {
            if path.is_file() {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading cached daily index {:?}", path))?;
                if has_header(&text) {
                    log::debug!("Using cached daily index {:?}", path);
                    return Ok(text);
                }
                log::warn!("Discarding cached daily index {:?} without a header row", path);
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }

        let url = Url::parse(&daily_index_url(date))?;
        let bytes = self.fetcher.get_bytes(&url, &[]).await?;
        let text = decode_markup(&bytes).into_owned();
        if !has_header(&text) {
            bail!("{} is not a daily index (no `{}` header row)", url, HEADER_MARKER);
        }

        if let Some(path) = &cache_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            if let Err(e) = write_atomic(path, text.as_bytes()) {
                log::warn!("Failed to cache daily index {:?}: {}", path, e);
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl DiscoverySource for BulkIndexSource {
    fn name(&self) -> &'static str {
        "daily-index"
    }

    async fn discover_until(&self, window_days: u32, end: NaiveDate) -> Vec<FilingReference> {
        let mut references = Vec::new();

        for date in window_dates(window_days, end) {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                log::info!("Skipping daily index for {} (weekend)", date);
                continue;
            }

            match self.load_day(date).await {
                Ok(text) => {
                    let rows = parse_daily_index(&text);
                    let found = references_from_rows(&rows, &self.form);
                    log::info!(
                        "Daily index {}: {} row(s), {} form {} filing(s)",
                        date,
                        rows.len(),
                        found.len(),
                        self.form
                    );
                    references.extend(found);
                }
                Err(e) => log::warn!("Skipping daily index for {}: {:#}", date, e),
            }
        }

        dedup_by_accession(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER_IDX: &str = "Description:           Daily Index of EDGAR Dissemination Feed by Company Name
Last Data Received:    June 18, 2025
Comments:              webmaster@sec.gov
Anonymous FTP:         ftp://ftp.sec.gov/edgar/

CIK|Company Name|Form Type|Date Filed|File Name
--------------------------------------------------------------------------------
1000045|NICHOLAS FINANCIAL INC|4|20250618|edgar/data/1000045/0001000045-25-000010.txt
1000097|KINGDON CAPITAL MANAGEMENT, L.L.C.|SC 13G/A|20250618|edgar/data/1000097/0000919574-25-004512.txt
1000209|MEDALLION FINANCIAL CORP|4/A|20250618|edgar/data/1000209/0001000209-25-000031.txt
1000228|HENRY SCHEIN INC|4|20250618|edgar/data/1000228/0001209191-25-038877.txt
1000275|ROYAL BANK OF CANADA|424B2|20250618|edgar/data/1000275/0001213900-25-054321.txt
";

    #[test]
    fn test_parse_skips_preamble() {
        let rows = parse_daily_index(MASTER_IDX);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].issuer_id, "1000045");
        assert_eq!(rows[1].company_name, "KINGDON CAPITAL MANAGEMENT, L.L.C.");
        assert_eq!(rows[4].file_path, "edgar/data/1000275/0001213900-25-054321.txt");
    }

    #[test]
    fn test_only_exact_form_rows() {
        let rows = parse_daily_index(MASTER_IDX);
        let refs = references_from_rows(&rows, &ReportType::Form4);
        assert_eq!(refs.len(), 2);
        assert_eq!(
            refs[0].link,
            "https://www.sec.gov/Archives/edgar/data/1000045/0001000045-25-000010.txt"
        );
        assert!(refs.iter().all(|r| r.classification == Classification::Exact));
    }

    #[test]
    fn test_missing_header_yields_nothing() {
        assert!(parse_daily_index("1000045|X|4|20250618|edgar/data/1/2.txt").is_empty());
    }

    #[test]
    fn test_daily_index_url() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 18).unwrap();
        assert_eq!(
            daily_index_url(date),
            "https://www.sec.gov/Archives/edgar/daily-index/2025/QTR2/master.20250618.idx"
        );
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()), 4);
    }
}
