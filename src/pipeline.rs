use anyhow::Result;
use chrono::{NaiveDate, Utc};
use futures::{future, stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::PipelineConfig;
use crate::core::types::{FilingReference, PurchaseTransaction, RawDocument};
use crate::edgar::accession::{resolve, FilingKey, SeenKeys};
use crate::edgar::discovery::DiscoverySource;
use crate::edgar::parsing::Extractor;
use crate::fetch::Fetcher;
use crate::utils::dirs;
use crate::utils::progress::ProgressTracker;

/// Records and counters of one batch run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub records: Vec<PurchaseTransaction>,
    pub discovered: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub unresolvable: usize,
    pub extract_errors: usize,
    pub filings_without_records: usize,
    pub skipped_for_budget: usize,
    pub fetched_live: usize,
    pub cache_hits: usize,
}

impl BatchReport {
    /// No qualifying transaction was found. A normal outcome, not a failure.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} record(s) from {} reference(s): {} duplicate, {} malformed, {} not downloaded, \
             {} extraction error(s), {} without records, {} skipped for time budget; \
             {} live request(s), {} cache hit(s)",
            self.records.len(),
            self.discovered,
            self.duplicates,
            self.malformed,
            self.unresolvable,
            self.extract_errors,
            self.filings_without_records,
            self.skipped_for_budget,
            self.fetched_live,
            self.cache_hits
        )
    }
}

enum Outcome {
    Records(Vec<PurchaseTransaction>),
    Unresolvable,
    ExtractError,
}

/// Extracts every document independently; a failing document is logged and
/// counted without affecting the others.
pub fn extract_documents(extractor: &Extractor, docs: &[RawDocument]) -> (Vec<PurchaseTransaction>, usize) {
    let mut records = Vec::new();
    let mut errors = 0;
    for doc in docs {
        match extractor.extract(doc) {
            Ok(found) => records.extend(found),
            Err(e) => {
                errors += 1;
                log::error!("Extraction failed for {}: {}", doc.url, e);
            }
        }
    }
    (records, errors)
}

/// Discovery, resolution, fetch and extraction over a bounded worker pool.
pub struct Pipeline {
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    workers: usize,
    budget: Duration,
}

impl Pipeline {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            extractor: Arc::new(Extractor::default()),
            workers: 2,
            budget: Duration::from_secs(600),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        dirs::ensure_data_dirs(&config.data_dir)?;
        let fetcher = Arc::new(Fetcher::from_config(config)?);
        Ok(Self::new(fetcher)
            .with_workers(config.workers)
            .with_budget(config.batch_budget))
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, 4);
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn fetcher(&self) -> Arc<Fetcher> {
        self.fetcher.clone()
    }

    pub async fn run(
        &self,
        source: &dyn DiscoverySource,
        window_days: u32,
        progress: &ProgressTracker,
    ) -> BatchReport {
        self.run_until(source, window_days, Utc::now().date_naive(), progress)
            .await
    }

    /// Runs discovery for the window ending on `end`, then processes what it found.
    pub async fn run_until(
        &self,
        source: &dyn DiscoverySource,
        window_days: u32,
        end: NaiveDate,
        progress: &ProgressTracker,
    ) -> BatchReport {
        let live_before = self.fetcher.live_requests();
        let hits_before = self.fetcher.cache_hits();

        let references = source.discover_until(window_days, end).await;
        log::info!(
            "{} discovery found {} reference(s) over {} day(s)",
            source.name(),
            references.len(),
            window_days.max(1)
        );

        let mut report = self.process(references, progress).await;
        report.fetched_live = self.fetcher.live_requests() - live_before;
        report.cache_hits = self.fetcher.cache_hits() - hits_before;
        report
    }

    /// Resolves and deduplicates `references`, then fetches and extracts each
    /// filing. Per-filing failures are counted, never propagated.
    pub async fn process(&self, references: Vec<FilingReference>, progress: &ProgressTracker) -> BatchReport {
        let live_before = self.fetcher.live_requests();
        let hits_before = self.fetcher.cache_hits();
        let mut report = BatchReport {
            discovered: references.len(),
            ..Default::default()
        };

        let mut seen = SeenKeys::new();
        let mut queue = Vec::new();
        for reference in references {
            match resolve(&reference.link) {
                Ok(key) => {
                    if seen.insert(&key) {
                        queue.push((key, reference));
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(e) => {
                    report.malformed += 1;
                    log::warn!("Skipping reference: {}", e);
                }
            }
        }

        let queued = queue.len();
        progress.start(queued as u64);
        let deadline = Instant::now() + self.budget;

        let outcomes: Vec<Outcome> = stream::iter(queue)
            .take_while(|_| future::ready(Instant::now() < deadline))
            .map(|(key, reference)| async move {
                let outcome = self.process_one(&key, &reference).await;
                progress.increment(1);
                outcome
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;
        progress.finish();

        report.skipped_for_budget = queued - outcomes.len();
        if report.skipped_for_budget > 0 {
            log::warn!(
                "Batch budget of {:?} exhausted; {} filing(s) not started",
                self.budget,
                report.skipped_for_budget
            );
        }

        for outcome in outcomes {
            match outcome {
                Outcome::Records(records) if records.is_empty() => report.filings_without_records += 1,
                Outcome::Records(records) => report.records.extend(records),
                Outcome::Unresolvable => report.unresolvable += 1,
                Outcome::ExtractError => report.extract_errors += 1,
            }
        }

        report.fetched_live = self.fetcher.live_requests() - live_before;
        report.cache_hits = self.fetcher.cache_hits() - hits_before;

        if report.is_empty() {
            log::info!("No qualifying transactions in this batch (no data today)");
        }
        log::info!("Batch complete: {}", report.summary());
        report
    }

    async fn process_one(&self, key: &FilingKey, reference: &FilingReference) -> Outcome {
        let doc = match self.fetcher.fetch_filing(key, reference).await {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("Filing {} not downloaded: {}", key, e);
                return Outcome::Unresolvable;
            }
        };

        match self.extractor.extract(&doc) {
            Ok(records) => {
                log::debug!("{} purchase record(s) in {}", records.len(), doc.url);
                Outcome::Records(records)
            }
            Err(e) => {
                log::error!("Extraction failed for {}: {}", doc.url, e);
                Outcome::ExtractError
            }
        }
    }
}
