use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::types::PurchaseTransaction;

pub const CSV_HEADER: [&str; 7] = [
    "ticker",
    "insider_name",
    "trade_date",
    "shares",
    "price",
    "filing_url",
    "transaction_kind",
];

/// Hands a batch's records to persistent storage.
pub trait TransactionSink {
    /// Writes `records`, returning where they went. Nothing is written for an
    /// empty batch.
    fn write(&self, records: &[PurchaseTransaction]) -> Result<Option<PathBuf>>;
}

/// One CSV file per day: `<dir>/ceo_buys_<YYYY-MM-DD>.csv`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    date: Option<NaiveDate>,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            date: None,
        }
    }

    /// Names the file after `date` instead of today.
    pub fn for_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        self.dir
            .join(format!("ceo_buys_{}.csv", date.format("%Y-%m-%d")))
    }
}

impl TransactionSink for CsvSink {
    fn write(&self, records: &[PurchaseTransaction]) -> Result<Option<PathBuf>> {
        if records.is_empty() {
            log::info!("No records to save");
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {:?}", self.dir))?;
        let path = self.path();
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("opening {:?}", path))?;

        writer.write_record(CSV_HEADER)?;
        for record in records {
            writer.write_record([
                record.ticker.clone(),
                record.insider_name.clone(),
                record.trade_date.format("%Y-%m-%d").to_string(),
                record.shares.to_string(),
                record.price.to_string(),
                record.filing_url.clone(),
                record.kind.to_string(),
            ])?;
        }
        writer.flush()?;

        log::info!("Saved {} record(s) to {:?}", records.len(), path);
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TransactionKind;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::tempdir;

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 18).unwrap();
        let sink = CsvSink::new(dir.path().join("insider_ceo")).for_date(date);

        let record = PurchaseTransaction {
            ticker: "TST".to_string(),
            insider_name: "Doe, Jane".to_string(),
            shares: 1000,
            price: Decimal::from_str("12.50").unwrap(),
            trade_date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            filing_url: "https://www.sec.gov/x-index.htm".to_string(),
            kind: TransactionKind::Purchase,
        };

        let path = sink.write(&[record]).unwrap().unwrap();
        assert!(path.ends_with("insider_ceo/ceo_buys_2025-06-18.csv"));

        let content = fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ticker,insider_name,trade_date,shares,price,filing_url,transaction_kind"
        );
        assert_eq!(
            lines.next().unwrap(),
            "TST,\"Doe, Jane\",2025-06-16,1000,12.50,https://www.sec.gov/x-index.htm,Purchase"
        );
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));
        assert!(sink.write(&[]).unwrap().is_none());
        assert!(!dir.path().join("out").exists());
    }
}
