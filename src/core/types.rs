use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// How a discovery source decided that an entry is the form type it was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// A structured type marker (feed category, index column, API field) matched exactly.
    Exact,
    /// No structured marker was present; the free-text title looked right.
    Heuristic,
}

/// A discovered, unresolved pointer to a filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingReference {
    /// Source URL or archive path as the discovery source reported it.
    pub link: String,
    /// Human-readable index page, when the source named one.
    pub index_url: Option<String>,
    /// Direct machine-readable document URL, when the source named one.
    pub document_url: Option<String>,
    pub form_type: String,
    pub classification: Classification,
    pub discovered_at: DateTime<Utc>,
}

impl FilingReference {
    pub fn new(link: impl Into<String>, form_type: impl Into<String>) -> Self {
        FilingReference {
            link: link.into(),
            index_url: None,
            document_url: None,
            form_type: form_type.into(),
            classification: Classification::Exact,
            discovered_at: Utc::now(),
        }
    }

    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = Some(url.into());
        self
    }

    pub fn with_document_url(mut self, url: impl Into<String>) -> Self {
        self.document_url = Some(url.into());
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }
}

/// Validated document bytes and the URL they were served from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: Url,
    pub bytes: Vec<u8>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Purchase,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Purchase => write!(f, "Purchase"),
        }
    }
}

/// One open-market purchase by a chief executive, as handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseTransaction {
    pub ticker: String,
    pub insider_name: String,
    pub shares: u64,
    pub price: Decimal,
    pub trade_date: NaiveDate,
    pub filing_url: String,
    pub kind: TransactionKind,
}

impl PurchaseTransaction {
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.shares)
    }
}

/// Orders purchases by share count, largest first, and keeps the first `n`.
pub fn select_top(records: &[PurchaseTransaction], n: usize) -> Vec<PurchaseTransaction> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.shares.cmp(&a.shares).then_with(|| a.ticker.cmp(&b.ticker)));
    sorted.truncate(n);
    sorted
}
