pub mod accession;
pub mod api;
pub mod candidates;
pub mod discovery;
pub mod error;
pub mod feed;
pub mod index;
pub mod parsing;
pub mod report;

pub use accession::{resolve, FilingKey, SeenKeys};
pub use discovery::DiscoverySource;
pub use error::EdgarError;
pub use report::ReportType;

pub const EDGAR_BASE_URL: &str = "https://www.sec.gov";
pub const ARCHIVES_DATA_URL: &str = "https://www.sec.gov/Archives/edgar/data";
