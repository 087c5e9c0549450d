use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use url::Url;

use super::decode_markup;
use crate::core::types::{PurchaseTransaction, RawDocument, TransactionKind};
use crate::edgar::accession::resolve;
use crate::edgar::error::EdgarError;
use crate::fetch::OWNERSHIP_ROOT;

/// Title variants that identify a chief executive.
pub const CEO_TITLE_KEYWORDS: &[&str] = &[
    "chief executive officer",
    "chief executive",
    "principal executive officer",
    "ceo",
    "c.e.o",
];

/// Transaction code for an open-market purchase.
pub const OPEN_MARKET_PURCHASE: &str = "P";

/// Element lookups relative to the document's default namespace, if it declares one.
#[derive(Debug, Clone, Copy)]
struct Schema<'d> {
    ns: Option<&'d str>,
}

impl<'d> Schema<'d> {
    fn detect(doc: &'d Document<'_>) -> Self {
        Schema {
            ns: doc.root_element().tag_name().namespace(),
        }
    }

    fn is(&self, node: Node, local: &str) -> bool {
        if !node.is_element() {
            return false;
        }
        match self.ns {
            Some(ns) => node.has_tag_name((ns, local)),
            None => node.tag_name().namespace().is_none() && node.tag_name().name() == local,
        }
    }

    fn child<'a, 'i>(&self, node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
        node.children().find(|n| self.is(*n, local))
    }

    fn children<'a, 'i>(&self, node: Node<'a, 'i>, local: &str) -> Vec<Node<'a, 'i>> {
        node.children().filter(|n| self.is(*n, local)).collect()
    }

    fn path<'a, 'i>(&self, node: Node<'a, 'i>, path: &[&str]) -> Option<Node<'a, 'i>> {
        path.iter().try_fold(node, |n, local| self.child(n, local))
    }

    /// Trimmed text at `path`, looking through a `<value>` wrapper when present.
    fn text(&self, node: Node, path: &[&str]) -> Option<String> {
        let target = self.path(node, path)?;
        let target = self.child(target, "value").unwrap_or(target);
        target
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportingOwner {
    pub name: Option<String>,
    pub officer_titles: Vec<String>,
}

/// One non-derivative transaction entry as written, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionEntry {
    pub code: Option<String>,
    pub shares: Option<String>,
    pub price: Option<String>,
    pub date: Option<String>,
}

/// The fields of an ownership document the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipFiling {
    pub document_type: Option<String>,
    pub ticker: Option<String>,
    pub period_of_report: Option<NaiveDate>,
    pub owners: Vec<ReportingOwner>,
    pub transactions: Vec<TransactionEntry>,
}

impl OwnershipFiling {
    pub fn parse(text: &str, url: &Url) -> Result<Self, EdgarError> {
        let doc = Document::parse(text).map_err(|e| EdgarError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let schema = Schema::detect(&doc);
        let root = doc.root_element();

        if root.tag_name().name() != OWNERSHIP_ROOT {
            return Err(EdgarError::UnexpectedDocumentType {
                url: url.to_string(),
                found: root.tag_name().name().to_string(),
            });
        }

        let owners = schema
            .children(root, "reportingOwner")
            .into_iter()
            .map(|owner| {
                let relationship = schema.child(owner, "reportingOwnerRelationship");
                let officer_titles = relationship
                    .map(|rel| {
                        ["officerTitle", "otherText"]
                            .iter()
                            .filter_map(|field| schema.text(rel, &[*field]))
                            .collect()
                    })
                    .unwrap_or_default();
                ReportingOwner {
                    name: schema.text(owner, &["reportingOwnerId", "rptOwnerName"]),
                    officer_titles,
                }
            })
            .collect();

        let transactions = schema
            .child(root, "nonDerivativeTable")
            .map(|table| {
                schema
                    .children(table, "nonDerivativeTransaction")
                    .into_iter()
                    .map(|tx| TransactionEntry {
                        code: schema.text(tx, &["transactionCoding", "transactionCode"]),
                        shares: schema.text(tx, &["transactionAmounts", "transactionShares"]),
                        price: schema.text(tx, &["transactionAmounts", "transactionPricePerShare"]),
                        date: schema.text(tx, &["transactionDate"]),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(OwnershipFiling {
            document_type: schema.text(root, &["documentType"]),
            ticker: schema.text(root, &["issuer", "issuerTradingSymbol"]),
            period_of_report: schema
                .text(root, &["periodOfReport"])
                .and_then(|raw| parse_date(&raw)),
            owners,
            transactions,
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', "")).ok()
}

static CHIEF_EXECUTIVE: Lazy<RoleMatcher> =
    Lazy::new(|| RoleMatcher::new(CEO_TITLE_KEYWORDS).expect("chief executive keywords"));

/// Case-insensitive match of officer titles against a keyword set. Keywords
/// only match as whole words, so "ceo" does not fire inside another word.
#[derive(Debug, Clone)]
pub struct RoleMatcher {
    pattern: Option<Regex>,
}

impl RoleMatcher {
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives = keywords
            .into_iter()
            .map(|k| regex::escape(k.as_ref().trim()))
            .filter(|k| !k.is_empty())
            .join("|");
        let pattern = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives))?)
        };
        Ok(RoleMatcher { pattern })
    }

    pub fn chief_executive() -> Self {
        CHIEF_EXECUTIVE.clone()
    }

    pub fn matches(&self, title: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(title))
    }
}

impl Default for RoleMatcher {
    fn default() -> Self {
        Self::chief_executive()
    }
}

/// Turns a validated ownership document into purchase records by the target role.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    roles: RoleMatcher,
}

impl Extractor {
    pub fn new(roles: RoleMatcher) -> Self {
        Extractor { roles }
    }

    pub fn extract(&self, doc: &RawDocument) -> Result<Vec<PurchaseTransaction>, EdgarError> {
        let filing_url = match resolve(doc.url.as_str()) {
            Ok(key) => key.filing_url(),
            Err(_) => {
                log::debug!("{} is not an archive path; keeping it as the filing url", doc.url);
                doc.url.to_string()
            }
        };

        let text = decode_markup(&doc.bytes);
        let filing = OwnershipFiling::parse(&text, &doc.url)?;
        self.purchases(&filing, &filing_url)
    }

    pub fn purchases(
        &self,
        filing: &OwnershipFiling,
        filing_url: &str,
    ) -> Result<Vec<PurchaseTransaction>, EdgarError> {
        let Some(ticker) = filing.ticker.as_deref() else {
            log::debug!("No trading symbol in {}", filing_url);
            return Ok(Vec::new());
        };

        let Some(owner) = filing
            .owners
            .iter()
            .find(|o| o.officer_titles.iter().any(|t| self.roles.matches(t)))
        else {
            return Ok(Vec::new());
        };

        let insider_name = owner
            .name
            .clone()
            .ok_or(EdgarError::MissingRequiredField("rptOwnerName"))?;

        let mut records = Vec::new();
        for (position, entry) in filing.transactions.iter().enumerate() {
            if entry.code.as_deref() != Some(OPEN_MARKET_PURCHASE) {
                continue;
            }
            match self.purchase(entry, filing, ticker, &insider_name, filing_url) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!(
                    "Skipping transaction #{} in {}: {}",
                    position + 1,
                    filing_url,
                    e
                ),
            }
        }
        Ok(records)
    }

    fn purchase(
        &self,
        entry: &TransactionEntry,
        filing: &OwnershipFiling,
        ticker: &str,
        insider_name: &str,
        filing_url: &str,
    ) -> Result<PurchaseTransaction, EdgarError> {
        let shares = entry
            .shares
            .as_deref()
            .and_then(parse_decimal)
            .and_then(|d| d.trunc().to_u64())
            .filter(|s| *s > 0)
            .ok_or(EdgarError::MissingRequiredField("transactionShares"))?;

        let price = entry
            .price
            .as_deref()
            .and_then(parse_decimal)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or(EdgarError::MissingRequiredField("transactionPricePerShare"))?;

        let trade_date = entry
            .date
            .as_deref()
            .and_then(parse_date)
            .or(filing.period_of_report)
            .ok_or(EdgarError::MissingRequiredField("transactionDate"))?;

        Ok(PurchaseTransaction {
            ticker: ticker.to_string(),
            insider_name: insider_name.to_string(),
            shares,
            price,
            trade_date,
            filing_url: filing_url.to_string(),
            kind: TransactionKind::Purchase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_URL: &str =
        "https://www.sec.gov/Archives/edgar/data/1234567/000123456725000042/wk-form4_1750287512.xml";

    fn transaction(code: &str, shares: &str, price: &str) -> String {
        format!(
            r#"<nonDerivativeTransaction>
            <securityTitle><value>Common Stock</value></securityTitle>
            <transactionDate><value>2025-06-16</value></transactionDate>
            <transactionCoding><transactionFormType>4</transactionFormType><transactionCode>{}</transactionCode></transactionCoding>
            <transactionAmounts>
                <transactionShares><value>{}</value></transactionShares>
                <transactionPricePerShare><value>{}</value></transactionPricePerShare>
                <transactionAcquiredDisposedCode><value>A</value></transactionAcquiredDisposedCode>
            </transactionAmounts>
        </nonDerivativeTransaction>"#,
            code, shares, price
        )
    }

    fn form4(root_attrs: &str, title: &str, transactions: &[String]) -> String {
        format!(
            r#"<?xml version="1.0"?>
<ownershipDocument{}>
    <schemaVersion>X0508</schemaVersion>
    <documentType>4</documentType>
    <periodOfReport>2025-06-17</periodOfReport>
    <issuer>
        <issuerCik>0001234567</issuerCik>
        <issuerName>Test Corp</issuerName>
        <issuerTradingSymbol>TST</issuerTradingSymbol>
    </issuer>
    <reportingOwner>
        <reportingOwnerId><rptOwnerCik>0009876543</rptOwnerCik><rptOwnerName>Doe Jane</rptOwnerName></reportingOwnerId>
        <reportingOwnerRelationship>
            <isDirector>1</isDirector>
            <isOfficer>1</isOfficer>
            <officerTitle>{}</officerTitle>
        </reportingOwnerRelationship>
    </reportingOwner>
    <nonDerivativeTable>{}</nonDerivativeTable>
</ownershipDocument>"#,
            root_attrs,
            title,
            transactions.join("\n")
        )
    }

    fn raw(xml: &str) -> RawDocument {
        RawDocument {
            url: Url::parse(DOC_URL).unwrap(),
            bytes: xml.as_bytes().to_vec(),
            from_cache: false,
        }
    }

    #[test]
    fn test_ceo_purchase_extracted() {
        let xml = form4(
            "",
            "Chairman, President and Chief Executive Officer",
            &[transaction("P", "1000", "12.50")],
        );
        let records = Extractor::default().extract(&raw(&xml)).unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.ticker, "TST");
        assert_eq!(r.insider_name, "Doe Jane");
        assert_eq!(r.shares, 1000);
        assert_eq!(r.price, Decimal::from_str("12.50").unwrap());
        assert_eq!(r.trade_date, NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());
        assert_eq!(r.kind, TransactionKind::Purchase);
        assert_eq!(
            r.filing_url,
            "https://www.sec.gov/Archives/edgar/data/1234567/000123456725000042/0001234567-25-000042-index.htm"
        );
    }

    #[test]
    fn test_other_officer_yields_nothing() {
        let xml = form4("", "Chief Financial Officer", &[transaction("P", "1000", "12.50")]);
        assert!(Extractor::default().extract(&raw(&xml)).unwrap().is_empty());
    }

    #[test]
    fn test_only_positive_open_market_purchases() {
        let xml = form4(
            "",
            "CEO",
            &[
                transaction("A", "1000", "12.50"),
                transaction("P", "0", "12.50"),
                transaction("P", "500", "0"),
                transaction("P", "abc", "12.50"),
                transaction("S", "1000", "12.50"),
                transaction("P", "2,500", "3.10"),
            ],
        );
        let records = Extractor::default().extract(&raw(&xml)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].shares, 2500);
    }

    #[test]
    fn test_namespaced_document_reads_the_same() {
        let txs = [transaction("P", "1000", "12.50")];
        let plain = form4("", "C.E.O.", &txs);
        let namespaced = form4(r#" xmlns="http://www.sec.gov/edgar/ownership""#, "C.E.O.", &txs);

        let extractor = Extractor::default();
        let a = extractor.extract(&raw(&plain)).unwrap();
        let b = extractor.extract(&raw(&namespaced)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_ticker_is_not_an_error() {
        let xml = form4("", "CEO", &[transaction("P", "1000", "12.50")])
            .replace("<issuerTradingSymbol>TST</issuerTradingSymbol>", "");
        assert!(Extractor::default().extract(&raw(&xml)).unwrap().is_empty());
    }

    #[test]
    fn test_trade_date_falls_back_to_period_of_report() {
        let xml = form4("", "CEO", &[transaction("P", "1000", "12.50")])
            .replace("<transactionDate><value>2025-06-16</value></transactionDate>", "");
        let records = Extractor::default().extract(&raw(&xml)).unwrap();
        assert_eq!(records[0].trade_date, NaiveDate::from_ymd_opt(2025, 6, 17).unwrap());
    }

    #[test]
    fn test_wrong_root_and_malformed_xml() {
        let extractor = Extractor::default();
        assert!(matches!(
            extractor.extract(&raw("<edgarSubmission><x/></edgarSubmission>")),
            Err(EdgarError::UnexpectedDocumentType { .. })
        ));
        assert!(matches!(
            extractor.extract(&raw("<ownershipDocument><issuer>")),
            Err(EdgarError::Parse { .. })
        ));
    }

    #[test]
    fn test_role_matcher_keywords() {
        let roles = RoleMatcher::chief_executive();
        assert!(roles.matches("Co-CEO"));
        assert!(roles.matches("President & Principal Executive Officer"));
        assert!(!roles.matches("Chief Operating Officer"));
        assert!(!roles.matches("Director"));
    }

    #[test]
    fn test_ceo_keyword_needs_word_boundaries() {
        let roles = RoleMatcher::chief_executive();
        assert!(roles.matches("CEO"));
        assert!(roles.matches("Chairman/CEO"));
        assert!(roles.matches("Pres., C.E.O."));
        assert!(!roles.matches("VP, Aceon Division"));
        assert!(!roles.matches("Ceorganization Lead"));
    }

    #[test]
    fn test_custom_keywords() {
        let roles = RoleMatcher::new(["chief financial officer", "CFO"]).unwrap();
        assert!(roles.matches("EVP & CFO"));
        assert!(!roles.matches("Chief Executive Officer"));
        assert!(!RoleMatcher::new(Vec::<String>::new()).unwrap().matches("CEO"));
    }

    #[test]
    fn test_parse_collects_owner_titles() {
        let xml = form4("", "Chief Executive Officer", &[]);
        let filing = OwnershipFiling::parse(&xml, &Url::parse(DOC_URL).unwrap()).unwrap();
        assert_eq!(filing.document_type.as_deref(), Some("4"));
        assert_eq!(filing.owners.len(), 1);
        assert_eq!(filing.owners[0].officer_titles, vec!["Chief Executive Officer"]);
        assert!(filing.transactions.is_empty());
    }
}
