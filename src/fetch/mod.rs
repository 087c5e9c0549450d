pub mod cache;
pub mod transport;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::config::PipelineConfig;
use crate::core::types::{FilingReference, RawDocument};
use crate::edgar::accession::FilingKey;
use crate::edgar::candidates;
use crate::edgar::error::EdgarError;
use crate::edgar::parsing::decode_markup;
use crate::utils::dirs;
use crate::utils::rate_limit::RateLimiter;

pub use cache::DocumentCache;
pub use transport::{HttpResponse, MemoryTransport, ReqwestTransport, Scripted, Transport};

pub const OWNERSHIP_ROOT: &str = "ownershipDocument";

/// Bounded exponential backoff for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What a fetched body has to look like before it is cached or returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    OwnershipXml,
    IndexPage,
}

/// The content validation gate.
///
/// Near-empty bodies fail as retryable parse errors. A well-formed document
/// whose root is not an ownership document fails as `UnexpectedDocumentType`,
/// which is not retried.
pub fn validate(url: &Url, bytes: &[u8], kind: ContentKind, min_bytes: usize) -> Result<(), EdgarError> {
    if bytes.len() < min_bytes {
        return Err(EdgarError::Parse {
            url: url.to_string(),
            reason: format!("body is {} bytes, below the {} byte floor", bytes.len(), min_bytes),
        });
    }

    let text = decode_markup(bytes);
    match kind {
        ContentKind::OwnershipXml => {
            let doc = roxmltree::Document::parse(&text).map_err(|e| EdgarError::Parse {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            let root = doc.root_element().tag_name().name();
            if root != OWNERSHIP_ROOT {
                return Err(EdgarError::UnexpectedDocumentType {
                    url: url.to_string(),
                    found: root.to_string(),
                });
            }
            Ok(())
        }
        ContentKind::IndexPage => {
            if text.to_ascii_lowercase().contains("href") {
                Ok(())
            } else {
                Err(EdgarError::Parse {
                    url: url.to_string(),
                    reason: "index page carries no links".to_string(),
                })
            }
        }
    }
}

fn status_error(url: &Url, status: u16) -> EdgarError {
    if status == 429 || status >= 500 {
        EdgarError::TransientFetch {
            url: url.to_string(),
            reason: format!("HTTP {}", status),
        }
    } else {
        EdgarError::DefinitiveNotFound {
            url: url.to_string(),
            status,
        }
    }
}

/// Retrieves documents from the registry under the shared rate limit, with
/// bounded retries and a URL-keyed document cache.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    cache: DocumentCache,
    policy: RetryPolicy,
    min_document_bytes: usize,
    live_requests: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        cache: DocumentCache,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            limiter,
            cache,
            policy,
            min_document_bytes: 200,
            live_requests: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
        }
    }

    pub fn with_min_document_bytes(mut self, min_document_bytes: usize) -> Self {
        self.min_document_bytes = min_document_bytes;
        self
    }

    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&config.user_agent, config.timeout)?;
        let cache = DocumentCache::new(dirs::document_cache_dir(&config.data_dir))?;
        Ok(Self::new(
            Arc::new(transport),
            RateLimiter::edgar(config.request_interval),
            cache,
            config.retry.clone(),
        )
        .with_min_document_bytes(config.min_document_bytes))
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    /// Requests that actually went out to the transport.
    pub fn live_requests(&self) -> usize {
        self.live_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    async fn send(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse, EdgarError> {
        self.limiter.acquire().await;
        self.live_requests.fetch_add(1, Ordering::Relaxed);
        self.transport.get(url, headers).await
    }

    async fn backoff(&self, url: &Url, attempt: u32, error: &EdgarError) {
        let delay = self.policy.delay_for(attempt);
        log::warn!(
            "Attempt {}/{} for {} failed: {}; retrying in {:?}",
            attempt,
            self.policy.max_attempts,
            url,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
    }

    /// Rate-limited GET with retries, for feeds, daily indexes and API pages.
    /// Bodies are neither validated nor cached.
    pub async fn get_bytes(&self, url: &Url, headers: &[(&str, &str)]) -> Result<Vec<u8>, EdgarError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.send(url, headers).await {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => status_error(url, response.status),
                Err(e) => e,
            };
            if !error.is_retryable() || attempt >= self.policy.max_attempts {
                return Err(error);
            }
            self.backoff(url, attempt, &error).await;
        }
    }

    /// Transport failures retry up to the policy's attempt budget; content
    /// that fails to parse is re-fetched once.
    async fn fetch_live(&self, url: &Url, kind: ContentKind) -> Result<Vec<u8>, EdgarError> {
        let mut attempt = 0;
        let mut reparsed = false;
        loop {
            attempt += 1;
            let error = match self.send(url, &[]).await {
                Ok(response) if response.is_success() => {
                    match validate(url, &response.body, kind, self.min_document_bytes) {
                        Ok(()) => return Ok(response.body),
                        Err(e) => e,
                    }
                }
                Ok(response) => status_error(url, response.status),
                Err(e) => e,
            };
            let retry = match error {
                EdgarError::Parse { .. } => !std::mem::replace(&mut reparsed, true),
                ref e => e.is_retryable(),
            };
            if !retry || attempt >= self.policy.max_attempts {
                return Err(error);
            }
            self.backoff(url, attempt, &error).await;
        }
    }

    /// A valid cached copy of `url`, if any. An invalid copy is deleted.
    fn cached(&self, url: &Url, kind: ContentKind) -> Option<RawDocument> {
        let bytes = match self.cache.read(url) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to read cached copy of {}: {}", url, e);
                return None;
            }
        };

        match validate(url, &bytes, kind, self.min_document_bytes) {
            Ok(()) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("Cache hit for {}", url);
                Some(RawDocument {
                    url: url.clone(),
                    bytes,
                    from_cache: true,
                })
            }
            Err(e) => {
                log::warn!("Discarding invalid cached copy of {}: {}", url, e);
                if let Err(e) = self.cache.remove(url) {
                    log::warn!("Failed to remove cached copy of {}: {}", url, e);
                }
                None
            }
        }
    }

    /// A filing index page from the cache only.
    pub fn cached_index_page(&self, url: &Url) -> Option<String> {
        self.cached(url, ContentKind::IndexPage)
            .map(|page| decode_markup(&page.bytes).into_owned())
    }

    async fn fetch_one(&self, url: &Url, kind: ContentKind, use_cache: bool) -> Result<RawDocument, EdgarError> {
        if use_cache {
            if let Some(doc) = self.cached(url, kind) {
                return Ok(doc);
            }
        }

        let bytes = self.fetch_live(url, kind).await?;
        if use_cache {
            if let Err(e) = self.cache.write(url, &bytes) {
                log::warn!("Failed to cache {}: {}", url, e);
            }
        }
        Ok(RawDocument {
            url: url.clone(),
            bytes,
            from_cache: false,
        })
    }

    async fn first_valid(&self, urls: &[Url], use_cache: bool, label: &str) -> Result<RawDocument, EdgarError> {
        for url in urls {
            match self.fetch_one(url, ContentKind::OwnershipXml, use_cache).await {
                Ok(doc) => return Ok(doc),
                Err(e) => log::debug!("Candidate {} rejected: {}", url, e),
            }
        }
        Err(EdgarError::UnresolvableDocument {
            key: label.to_string(),
            tried: urls.len(),
        })
    }

    /// Tries `urls` in order against the network only; the first valid
    /// ownership document wins.
    pub async fn fetch(&self, urls: &[Url]) -> Result<RawDocument, EdgarError> {
        let label = urls.first().map(Url::to_string).unwrap_or_default();
        self.first_valid(urls, false, &label).await
    }

    /// Like [`Fetcher::fetch`], consulting and filling the document cache.
    pub async fn fetch_and_cache(&self, urls: &[Url]) -> Result<RawDocument, EdgarError> {
        let label = urls.first().map(Url::to_string).unwrap_or_default();
        self.first_valid(urls, true, &label).await
    }

    /// Fetches a filing's human-readable index page, through the cache.
    pub async fn fetch_index_page(&self, url: &Url) -> Result<String, EdgarError> {
        let page = self.fetch_one(url, ContentKind::IndexPage, true).await?;
        Ok(decode_markup(&page.bytes).into_owned())
    }

    /// Resolves the candidate URLs for one filing and fetches the first valid one.
    ///
    /// Every candidate known without a request is looked up in the cache
    /// first, so a filing that resolved once is never requested again.
    pub async fn fetch_filing(&self, key: &FilingKey, reference: &FilingReference) -> Result<RawDocument, EdgarError> {
        let index_url = reference.index_url.as_deref();
        let direct = reference.document_url.as_deref();

        let known = candidates::cached_candidates(self, key, index_url, direct);
        if let Some(doc) = known
            .urls
            .iter()
            .find_map(|url| self.cached(url, ContentKind::OwnershipXml))
        {
            return Ok(doc);
        }

        let urls = if known.index_scraped {
            known.urls
        } else {
            candidates::candidates(self, key, index_url, direct).await
        };

        if urls.is_empty() {
            return Err(EdgarError::UnresolvableDocument {
                key: key.to_string(),
                tried: 0,
            });
        }

        self.first_valid(&urls, true, &key.to_string()).await
    }
}
