use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::sync::Arc;
use url::Url;

use super::discovery::{dedup_by_accession, window_range, DiscoverySource};
use super::report::ReportType;
use crate::core::types::{Classification, FilingReference};
use crate::fetch::Fetcher;

pub const API_URL: &str = "https://api.sec-api.io/form4";
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(alias = "transactions", alias = "filings", default)]
    data: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    #[serde(alias = "accessionNo")]
    accession_number: Option<String>,
    link_to_xml: Option<String>,
    link_to_filing_details: Option<String>,
    form_type: Option<String>,
    filed_at: Option<String>,
}

/// References from one API response: items of `form` filed on or after
/// Items of `form` filed within `window` that name a machine-readable document.
pub fn parse_api_response(
    body: &[u8],
    form: &ReportType,
    window: &RangeInclusive<NaiveDate>,
) -> Result<Vec<FilingReference>> {
    let response: ApiResponse = serde_json::from_slice(body).context("parsing filings api response")?;

    Ok(response
        .data
        .into_iter()
        .filter(|item| item.form_type.as_deref().map_or(true, |t| form.matches(t)))
        .filter(|item| {
            let filed = item
                .filed_at
                .as_deref()
                .and_then(|f| DateTime::parse_from_rfc3339(f).ok())
                .map(|dt| dt.date_naive());
            !matches!(filed, Some(day) if !window.contains(&day))
        })
        .filter_map(|item| {
            let Some(xml) = item.link_to_xml else {
                log::debug!(
                    "API item {} has no document link",
                    item.accession_number.as_deref().unwrap_or("?")
                );
                return None;
            };
            let mut reference = FilingReference::new(xml.clone(), form.to_string())
                .with_document_url(xml)
                .with_classification(Classification::Exact);
            if let Some(details) = item.link_to_filing_details {
                reference = reference.with_index_url(details);
            }
            Some(reference)
        })
        .collect())
}

/// Discovery through a third-party filings API that links each filing's
/// XML document directly. Requires an access key.
pub struct ApiSource {
    fetcher: Arc<Fetcher>,
    form: ReportType,
    api_key: String,
    limit: usize,
}

impl ApiSource {
    pub fn new(fetcher: Arc<Fetcher>, form: ReportType, api_key: &str) -> Self {
        Self {
            fetcher,
            form,
            api_key: api_key.to_string(),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn request_url(&self) -> Result<Url> {
        Url::parse_with_params(
            API_URL,
            &[("limit", self.limit.to_string()), ("sort", "-filedAt".to_string())],
        )
        .context("building api url")
    }

    async fn fetch(&self, window: &RangeInclusive<NaiveDate>) -> Result<Vec<FilingReference>> {
        let url = self.request_url()?;
        let auth = format!("Bearer {}", self.api_key);
        let body = self
            .fetcher
            .get_bytes(&url, &[("Authorization", auth.as_str())])
            .await?;
        parse_api_response(&body, &self.form, window)
    }
}

#[async_trait]
impl DiscoverySource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn discover_until(&self, window_days: u32, end: NaiveDate) -> Vec<FilingReference> {
        match self.fetch(&window_range(window_days, end)).await {
            Ok(references) => {
                log::info!("Filings API returned {} reference(s)", references.len());
                dedup_by_accession(references)
            }
            Err(e) => {
                log::warn!("Filings API unavailable: {:#}", e);
                Vec::new()
            }
        }
    }
}
