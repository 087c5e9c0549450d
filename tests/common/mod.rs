#![allow(dead_code)]

use insider::fetch::{DocumentCache, Fetcher, MemoryTransport, RetryPolicy};
use insider::utils::rate_limit::RateLimiter;
use insider::FilingKey;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ISSUER: &str = "1234567";

pub fn key(n: u32) -> FilingKey {
    FilingKey::new(ISSUER, &format!("0001234567-25-{:06}", n)).unwrap()
}

/// Link as the daily index names the filing.
pub fn index_row_link(n: u32) -> String {
    format!(
        "https://www.sec.gov/Archives/edgar/data/{}/{}.txt",
        ISSUER,
        key(n).accession_number()
    )
}

pub fn document_url(n: u32) -> String {
    format!("{}wk-form4_17502875{:02}.xml", key(n).archive_dir(), n)
}

pub fn fetcher(transport: Arc<MemoryTransport>, cache_dir: &Path) -> Arc<Fetcher> {
    Arc::new(Fetcher::new(
        transport,
        Arc::new(RateLimiter::new(Duration::ZERO)),
        DocumentCache::new(cache_dir).unwrap(),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    ))
}

pub fn index_page(n: u32) -> String {
    let doc = document_url(n);
    let file = doc.rsplit('/').next().unwrap();
    format!(
        r#"<html><head><title>EDGAR Filing Documents for {acc}</title></head><body>
<table class="tableFile" summary="Document Format Files">
<tr><th>Seq</th><th>Description</th><th>Document</th><th>Type</th></tr>
<tr><td>1</td><td>FORM 4</td><td><a href="/Archives/edgar/data/{issuer}/{digits}/xslF345X05/{file}">{file}</a></td><td>4</td></tr>
<tr><td>1</td><td>FORM 4</td><td><a href="/Archives/edgar/data/{issuer}/{digits}/{file}">{file}</a></td><td>4</td></tr>
</table></body></html>"#,
        acc = key(n).accession_number(),
        issuer = ISSUER,
        digits = key(n).accession_digits(),
        file = file
    )
}

pub fn form4(ticker: &str, title: &str, code: &str, shares: &str, price: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<ownershipDocument>
    <schemaVersion>X0508</schemaVersion>
    <documentType>4</documentType>
    <periodOfReport>2025-06-17</periodOfReport>
    <issuer>
        <issuerCik>0001234567</issuerCik>
        <issuerName>Test Corp</issuerName>
        <issuerTradingSymbol>{ticker}</issuerTradingSymbol>
    </issuer>
    <reportingOwner>
        <reportingOwnerId><rptOwnerCik>0009876543</rptOwnerCik><rptOwnerName>Doe Jane</rptOwnerName></reportingOwnerId>
        <reportingOwnerRelationship><isOfficer>1</isOfficer><officerTitle>{title}</officerTitle></reportingOwnerRelationship>
    </reportingOwner>
    <nonDerivativeTable>
        <nonDerivativeTransaction>
            <securityTitle><value>Common Stock</value></securityTitle>
            <transactionDate><value>2025-06-16</value></transactionDate>
            <transactionCoding><transactionFormType>4</transactionFormType><transactionCode>{code}</transactionCode></transactionCoding>
            <transactionAmounts>
                <transactionShares><value>{shares}</value></transactionShares>
                <transactionPricePerShare><value>{price}</value></transactionPricePerShare>
                <transactionAcquiredDisposedCode><value>A</value></transactionAcquiredDisposedCode>
            </transactionAmounts>
        </nonDerivativeTransaction>
    </nonDerivativeTable>
</ownershipDocument>"#,
        ticker = ticker,
        title = title,
        code = code,
        shares = shares,
        price = price
    )
}

pub fn ceo_purchase(ticker: &str, shares: u64) -> String {
    form4(ticker, "Chief Executive Officer", "P", &shares.to_string(), "12.50")
}

/// Serves filing `n`: its index page and its document.
pub fn serve_filing(transport: &MemoryTransport, n: u32, document: &str) {
    transport.respond(&key(n).index_url(), 200, index_page(n));
    transport.respond(&document_url(n), 200, document.to_string());
}
