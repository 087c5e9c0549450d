use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::error::EdgarError;
use super::ARCHIVES_DATA_URL;

static ARCHIVE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|/)data/(\d{1,10})/([^/?#]+)").expect("archive path pattern")
});

static CANONICAL_ACCESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10}-\d{2}-\d{6}$").expect("accession pattern"));

/// Canonical identity of one filing: zero-padded issuer id plus dashed accession number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilingKey {
    issuer_id: String,
    accession_number: String,
}

impl FilingKey {
    pub fn new(issuer_id: &str, accession: &str) -> Result<Self, EdgarError> {
        let issuer = issuer_id.trim();
        if issuer.is_empty() || issuer.len() > 10 || !issuer.chars().all(|c| c.is_ascii_digit()) {
            return Err(EdgarError::MalformedReference(format!(
                "issuer id {:?} is not a 1-10 digit number",
                issuer_id
            )));
        }
        let accession_number = normalize_accession(accession).ok_or_else(|| {
            EdgarError::MalformedReference(format!("accession {:?} is not canonical", accession))
        })?;

        Ok(FilingKey {
            issuer_id: format!("{:0>10}", issuer),
            accession_number,
        })
    }

    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    pub fn accession_number(&self) -> &str {
        &self.accession_number
    }

    pub fn accession_digits(&self) -> String {
        self.accession_number.replace('-', "")
    }

    /// Issuer id as the archive paths spell it, without the zero padding.
    pub fn issuer_number(&self) -> &str {
        let trimmed = self.issuer_id.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }

    /// Canonical archive directory for the filing, with a trailing slash.
    pub fn archive_dir(&self) -> String {
        format!(
            "{}/{}/{}/",
            ARCHIVES_DATA_URL,
            self.issuer_number(),
            self.accession_digits()
        )
    }

    pub fn index_url(&self) -> String {
        format!("{}{}-index.htm", self.archive_dir(), self.accession_number)
    }

    /// Durable link for downstream consumers, independent of which candidate document served.
    pub fn filing_url(&self) -> String {
        self.index_url()
    }
}

impl fmt::Display for FilingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.issuer_id, self.accession_number)
    }
}

/// Derives a [`FilingKey`] from any archive URL or path of the form `.../data/<issuer>/<accession>/...`.
pub fn resolve(raw: &str) -> Result<FilingKey, EdgarError> {
    let captures = ARCHIVE_PATH.captures(raw.trim()).ok_or_else(|| {
        EdgarError::MalformedReference(format!("no issuer/accession segment in {}", raw))
    })?;

    let issuer = &captures[1];
    let accession = &captures[2];
    FilingKey::new(issuer, accession)
        .map_err(|e| EdgarError::MalformedReference(format!("{} ({})", raw, e)))
}

/// Brings an accession number, or a path segment that embeds one, to `##########-##-######`.
pub fn normalize_accession(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();

    let candidate = if cleaned.len() == 18 && cleaned.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &cleaned[..10], &cleaned[10..12], &cleaned[12..])
    } else {
        cleaned
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    };

    if CANONICAL_ACCESSION.is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Accession numbers already handed out during one batch window.
#[derive(Debug, Default)]
pub struct SeenKeys {
    seen: HashSet<String>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time an accession number is offered.
    pub fn insert(&mut self, key: &FilingKey) -> bool {
        self.seen.insert(key.accession_number.clone())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_canonical(key: &FilingKey) {
        assert_eq!(key.issuer_id().len(), 10);
        assert!(key.issuer_id().chars().all(|c| c.is_ascii_digit()));
        assert!(CANONICAL_ACCESSION.is_match(key.accession_number()));
    }

    #[test]
    fn test_resolve_index_page_url() {
        let key = resolve(
            "https://www.sec.gov/Archives/edgar/data/1127602/000112760225017854/0001127602-25-017854-index.htm",
        )
        .unwrap();
        assert_eq!(key.issuer_id(), "0001127602");
        assert_eq!(key.accession_number(), "0001127602-25-017854");
        assert_canonical(&key);
    }

    #[test]
    fn test_resolve_bulk_index_path() {
        let key = resolve("edgar/data/320193/0000320193-25-000071.txt").unwrap();
        assert_eq!(key.issuer_id(), "0000320193");
        assert_eq!(key.accession_number(), "0000320193-25-000071");
    }

    #[test]
    fn test_resolve_document_url_in_subfolder() {
        let key = resolve(
            "https://www.sec.gov/Archives/edgar/data/1800/000180025000012/xslF345X05/form4.xml",
        );
        assert!(key.is_err(), "15 digits cannot be an accession number");

        let key = resolve(
            "https://www.sec.gov/Archives/edgar/data/1800/000180025000012345/xslF345X05/form4.xml",
        )
        .unwrap();
        assert_eq!(key.accession_number(), "0001800250-00-012345");
        assert_canonical(&key);
    }

    #[test]
    fn test_resolve_rejects_unrelated_urls() {
        for raw in [
            "https://www.sec.gov/cgi-bin/browse-edgar?action=getcurrent",
            "",
            "data/12345678901/000112760225017854/",
            "data/1127602/not-an-accession/",
        ] {
            assert!(
                matches!(resolve(raw), Err(EdgarError::MalformedReference(_))),
                "expected failure for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_normalize_accession_variants() {
        assert_eq!(
            normalize_accession("000112760225017854").as_deref(),
            Some("0001127602-25-017854")
        );
        assert_eq!(
            normalize_accession("0001127602-25-017854-index.htm").as_deref(),
            Some("0001127602-25-017854")
        );
        assert_eq!(normalize_accession("0001127602--25-017854").as_deref(), Some("0001127602-25-017854"));
        assert_eq!(normalize_accession("12345"), None);
    }

    #[test]
    fn test_urls_built_from_key() {
        let key = FilingKey::new("1127602", "0001127602-25-017854").unwrap();
        assert_eq!(
            key.archive_dir(),
            "https://www.sec.gov/Archives/edgar/data/1127602/000112760225017854/"
        );
        assert_eq!(
            key.index_url(),
            "https://www.sec.gov/Archives/edgar/data/1127602/000112760225017854/0001127602-25-017854-index.htm"
        );
        assert_eq!(key.to_string(), "0001127602/0001127602-25-017854");
    }

    #[test]
    fn test_seen_keys_drop_repeats() {
        let mut seen = SeenKeys::new();
        let a = FilingKey::new("1", "0000000001-25-000001").unwrap();
        let b = resolve("edgar/data/1/0000000001-25-000001.txt").unwrap();
        assert!(seen.insert(&a));
        assert!(!seen.insert(&b));
        assert_eq!(seen.len(), 1);
    }
}
