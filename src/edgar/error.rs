use thiserror::Error;

/// Failures of the discovery/fetch/extract pipeline.
///
/// Every variant except `Config` is recovered locally by the caller: the
/// affected reference, URL, document or transaction is skipped and the batch
/// continues.
#[derive(Debug, Clone, Error)]
pub enum EdgarError {
    #[error("malformed filing reference: {0}")]
    MalformedReference(String),

    #[error("no valid document among {tried} candidate url(s) for {key}")]
    UnresolvableDocument { key: String, tried: usize },

    #[error("transient failure fetching {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    #[error("{url} answered HTTP {status}")]
    DefinitiveNotFound { url: String, status: u16 },

    #[error("unexpected document type <{found}> in {url}")]
    UnexpectedDocumentType { url: String, found: String },

    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("missing required field `{0}`")]
    MissingRequiredField(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EdgarError {
    /// Whether another attempt at the same URL may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EdgarError::TransientFetch { .. } | EdgarError::Parse { .. }
        )
    }
}
