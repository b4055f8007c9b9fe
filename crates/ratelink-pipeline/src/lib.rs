//! Linkage pipeline: crawl uncached records, then tabulate match decisions
//! from the cache.
//!
//! Crawling and matching are separate passes that may run in different
//! processes. The cache is the only state shared between them.

use std::collections::HashSet;
use std::sync::Mutex;

use futures::StreamExt;
use ratelink_core::{
    CachedRecord, InputRecord, Lookup, LookupError, MatchDecision, MatchPolicy, match_record,
};
use ratelink_store::{ResultCache, StoreError};
use thiserror::Error;
use tracing::{info, warn};

pub mod crawler;
pub use crawler::Crawler;

#[cfg(test)]
mod testing;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("cache error: {0}")]
    Store(#[from] StoreError),
    #[error("result cache lock poisoned")]
    CachePoisoned,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records crawled at once. 1 gives strictly sequential processing.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Asked once before a batch crawl starts.
pub trait ConfirmGate {
    fn confirm(&self, pending: usize) -> bool;
}

/// Gate that never blocks.
pub struct AlwaysProceed;

impl ConfirmGate for AlwaysProceed {
    fn confirm(&self, _pending: usize) -> bool {
        true
    }
}

/// Input records left to crawl after filtering.
#[derive(Debug, Default)]
pub struct Prepared {
    pub pending: Vec<InputRecord>,
    /// Records dropped for repeating an earlier ID.
    pub duplicates: usize,
    /// Records dropped because the cache already holds their ID.
    pub already_cached: usize,
    /// Records dropped because the cache cannot store their ID.
    pub invalid_ids: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    Crawled { candidates: usize },
    /// Already cached, or being crawled by another task.
    Skipped,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub already_cached: usize,
    pub duplicates: usize,
    pub invalid_ids: usize,
    pub crawled: usize,
    /// Crawled records that found no candidates.
    pub empty: usize,
    pub skipped: usize,
    pub failed: Vec<(String, PipelineError)>,
    /// The confirmation gate refused the batch; nothing was crawled.
    pub declined: bool,
}

/// Decisions for every readable cache entry.
#[derive(Debug, Default)]
pub struct Tabulation {
    pub decisions: Vec<MatchDecision>,
    /// Cache entries that could not be read; skipped.
    pub malformed: Vec<StoreError>,
}

impl Tabulation {
    pub fn matched(&self) -> impl Iterator<Item = &MatchDecision> {
        self.decisions.iter().filter(|d| d.is_match())
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &MatchDecision> {
        self.decisions.iter().filter(|d| !d.is_match())
    }
}

/// Run the matcher over every entry in `cache`.
///
/// Decisions come out in the cache's scan order (by record ID).
pub fn tabulate<C: ResultCache + ?Sized>(
    cache: &C,
    policy: &MatchPolicy,
) -> Result<Tabulation, StoreError> {
    let scan = cache.read_all()?;
    for err in &scan.malformed {
        warn!(error = %err, "skipping unreadable cache entry");
    }

    let decisions: Vec<MatchDecision> =
        scan.records.iter().map(|r| match_record(r, policy)).collect();
    let tabulation = Tabulation {
        decisions,
        malformed: scan.malformed,
    };
    info!(
        records = tabulation.decisions.len(),
        matched = tabulation.matched().count(),
        malformed = tabulation.malformed.len(),
        "tabulated"
    );
    Ok(tabulation)
}

/// Releases an in-flight claim on drop.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.in_flight.lock() {
            ids.remove(&self.id);
        }
    }
}

/// Owns the lookup and the cache for a run.
pub struct Pipeline<L, C> {
    lookup: L,
    cache: Mutex<C>,
    in_flight: Mutex<HashSet<String>>,
    config: PipelineConfig,
}

impl<L: Lookup, C: ResultCache> Pipeline<L, C> {
    pub fn new(lookup: L, cache: C, config: PipelineConfig) -> Self {
        Self {
            lookup,
            cache: Mutex::new(cache),
            in_flight: Mutex::new(HashSet::new()),
            config,
        }
    }

    pub fn into_cache(self) -> Result<C, PipelineError> {
        self.cache.into_inner().map_err(|_| PipelineError::CachePoisoned)
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, C>, PipelineError> {
        self.cache.lock().map_err(|_| PipelineError::CachePoisoned)
    }

    fn claim(&self, id: &str) -> Result<Option<Claim<'_>>, PipelineError> {
        let mut ids = self.in_flight.lock().map_err(|_| PipelineError::CachePoisoned)?;
        if !ids.insert(id.to_string()) {
            return Ok(None);
        }
        Ok(Some(Claim {
            in_flight: &self.in_flight,
            id: id.to_string(),
        }))
    }

    /// Drop repeated IDs (keeping the first), IDs the cache already holds,
    /// and IDs the cache could never store.
    pub fn prepare(
        &self,
        records: impl IntoIterator<Item = InputRecord>,
    ) -> Result<Prepared, PipelineError> {
        let cache = self.lock_cache()?;
        let known = cache.known_ids()?;
        let mut seen = HashSet::new();
        let mut prepared = Prepared::default();

        for record in records {
            if !seen.insert(record.id.clone()) {
                prepared.duplicates += 1;
            } else if known.contains(&record.id) {
                prepared.already_cached += 1;
            } else if let Err(err) = cache.check_id(&record.id) {
                warn!(id = %record.id, error = %err, "dropping record");
                prepared.invalid_ids += 1;
            } else {
                prepared.pending.push(record);
            }
        }

        info!(
            already_searched = known.len(),
            removed = prepared.already_cached,
            duplicates = prepared.duplicates,
            invalid_ids = prepared.invalid_ids,
            pending = prepared.pending.len(),
            "prepared input"
        );
        Ok(prepared)
    }

    /// Crawl a single record unless it is cached or already being crawled.
    ///
    /// The cache entry is written only after the full plan ran; on a lookup
    /// failure nothing is written and the record stays eligible.
    pub async fn crawl_record(&self, record: &InputRecord) -> Result<CrawlOutcome, PipelineError> {
        let Some(_claim) = self.claim(&record.id)? else {
            return Ok(CrawlOutcome::Skipped);
        };
        {
            let cache = self.lock_cache()?;
            cache.check_id(&record.id)?;
            if cache.exists(&record.id)? {
                return Ok(CrawlOutcome::Skipped);
            }
        }

        let cached: CachedRecord = Crawler::new(&self.lookup).crawl(record).await?;

        let mut cache = self.lock_cache()?;
        if cache.exists(&record.id)? {
            return Ok(CrawlOutcome::Skipped);
        }
        cache.write(&cached)?;
        Ok(CrawlOutcome::Crawled {
            candidates: cached.results.len(),
        })
    }

    /// Filter `records`, ask `gate` once, then crawl everything pending.
    ///
    /// A record that fails is reported in [`CrawlReport::failed`] and the
    /// batch carries on.
    pub async fn crawl(
        &self,
        records: impl IntoIterator<Item = InputRecord>,
        gate: &dyn ConfirmGate,
    ) -> Result<CrawlReport, PipelineError> {
        let prepared = self.prepare(records)?;
        let mut report = CrawlReport {
            already_cached: prepared.already_cached,
            duplicates: prepared.duplicates,
            invalid_ids: prepared.invalid_ids,
            ..CrawlReport::default()
        };
        if prepared.pending.is_empty() {
            info!("nothing to crawl");
            return Ok(report);
        }
        if !gate.confirm(prepared.pending.len()) {
            info!(pending = prepared.pending.len(), "crawl declined");
            report.declined = true;
            return Ok(report);
        }

        let total = prepared.pending.len();
        let mut outcomes = futures::stream::iter(prepared.pending.iter())
            .map(|record| async move { (record, self.crawl_record(record).await) })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut done = 0usize;
        while let Some((record, outcome)) = outcomes.next().await {
            done += 1;
            match outcome {
                Ok(CrawlOutcome::Crawled { candidates }) => {
                    report.crawled += 1;
                    if candidates == 0 {
                        report.empty += 1;
                    }
                    info!(id = %record.id, candidates, done, total, "crawled");
                }
                Ok(CrawlOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    warn!(id = %record.id, error = %err, done, total, "crawl failed");
                    report.failed.push((record.id.clone(), err));
                }
            }
        }

        info!(
            crawled = report.crawled,
            empty = report.empty,
            skipped = report.skipped,
            failed = report.failed.len(),
            "crawl finished"
        );
        Ok(report)
    }

    /// Match every cached record with `policy`.
    pub fn tabulate(&self, policy: &MatchPolicy) -> Result<Tabulation, PipelineError> {
        let cache = self.lock_cache()?;
        Ok(tabulate(&*cache, policy)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLookup, establishment};
    use ratelink_core::PostcodeConfidence;
    use ratelink_store::{JsonDirCache, MemoryCache};
    use std::cell::Cell;

    fn fish_bar() -> InputRecord {
        InputRecord::new("g1", "The Fish Bar", "1 North Street", "BN1 2AB")
    }

    fn idle_pipeline() -> Pipeline<FakeLookup, MemoryCache> {
        Pipeline::new(FakeLookup::default(), MemoryCache::new(), PipelineConfig::default())
    }

    struct CountingGate {
        answer: bool,
        asked: Cell<usize>,
    }

    impl ConfirmGate for CountingGate {
        fn confirm(&self, _pending: usize) -> bool {
            self.asked.set(self.asked.get() + 1);
            self.answer
        }
    }

    #[tokio::test]
    async fn crawled_record_becomes_known() {
        let lookup = FakeLookup::default().respond(
            "Fish Bar",
            "BN1 2AB",
            vec![establishment("Fish Bar", "BN1 2AB")],
        );
        let pipeline = Pipeline::new(lookup, MemoryCache::new(), PipelineConfig::default());

        let outcome = pipeline.crawl_record(&fish_bar()).await.unwrap();

        assert_eq!(outcome, CrawlOutcome::Crawled { candidates: 1 });
        assert!(pipeline.lock_cache().unwrap().known_ids().unwrap().contains("g1"));
    }

    #[tokio::test]
    async fn second_crawl_is_a_noop() {
        let pipeline = idle_pipeline();
        pipeline.crawl_record(&fish_bar()).await.unwrap();
        let calls_after_first = pipeline.lookup.calls().len();

        let outcome = pipeline.crawl_record(&fish_bar()).await.unwrap();

        assert_eq!(outcome, CrawlOutcome::Skipped);
        assert_eq!(pipeline.lookup.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn failed_record_is_not_cached_and_batch_continues() {
        let lookup = FakeLookup::default().fail_on("Fish Bar", "BN1 2AB");
        let pipeline = Pipeline::new(lookup, MemoryCache::new(), PipelineConfig::default());
        let records = vec![
            fish_bar(),
            InputRecord::new("g2", "Costa Coffee", "2 High Street", "BN2 1AA"),
        ];

        let report = pipeline.crawl(records, &AlwaysProceed).await.unwrap();

        assert_eq!(report.crawled, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "g1");
        let cache = pipeline.into_cache().unwrap();
        assert!(!cache.exists("g1").unwrap());
        assert!(cache.exists("g2").unwrap());
    }

    #[tokio::test]
    async fn prepare_drops_duplicates_and_cached_ids() {
        let mut cache = MemoryCache::new();
        cache.write(&CachedRecord::from_crawl(&fish_bar(), Vec::new())).unwrap();
        let pipeline = Pipeline::new(FakeLookup::default(), cache, PipelineConfig::default());

        let prepared = pipeline
            .prepare(vec![
                fish_bar(),
                InputRecord::new("g2", "Costa", "High Street", "BN2 1AA"),
                InputRecord::new("g2", "Costa Again", "High Street", "BN2 1AA"),
            ])
            .unwrap();

        assert_eq!(prepared.already_cached, 1);
        assert_eq!(prepared.duplicates, 1);
        assert_eq!(prepared.pending.len(), 1);
        assert_eq!(prepared.pending[0].name, "Costa");
    }

    #[tokio::test]
    async fn unstorable_id_is_never_looked_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let record = InputRecord::new("place/42", "Fish Bar", "1 North Street", "BN1 2AB");

        for _ in 0..2 {
            let pipeline = Pipeline::new(
                FakeLookup::default(),
                JsonDirCache::open(tmp.path()).unwrap(),
                PipelineConfig::default(),
            );
            let report = pipeline.crawl(vec![record.clone()], &AlwaysProceed).await.unwrap();

            assert_eq!(report.invalid_ids, 1);
            assert_eq!(report.crawled, 0);
            assert!(report.failed.is_empty());
            assert!(pipeline.lookup.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn crawl_record_rejects_unstorable_id_before_lookup() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            FakeLookup::default(),
            JsonDirCache::open(tmp.path()).unwrap(),
            PipelineConfig::default(),
        );
        let record = InputRecord::new("place/42", "Fish Bar", "1 North Street", "BN1 2AB");

        let err = pipeline.crawl_record(&record).await.unwrap_err();

        assert!(matches!(err, PipelineError::Store(StoreError::InvalidId(_))));
        assert!(pipeline.lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn tabulate_skips_unreadable_entries() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cache = JsonDirCache::open(tmp.path()).unwrap();
        cache.write(&CachedRecord::from_crawl(&fish_bar(), Vec::new())).unwrap();
        drop(cache);
        std::fs::create_dir(tmp.path().join("stray.json")).unwrap();

        let cache = JsonDirCache::open(tmp.path()).unwrap();
        let tabulation = tabulate(&cache, &MatchPolicy::default()).unwrap();

        assert_eq!(tabulation.decisions.len(), 1);
        assert_eq!(tabulation.decisions[0].record_id, "g1");
        assert_eq!(tabulation.malformed.len(), 1);
    }

    #[tokio::test]
    async fn declined_gate_issues_no_lookups() {
        let pipeline = idle_pipeline();
        let gate = CountingGate {
            answer: false,
            asked: Cell::new(0),
        };

        let report = pipeline.crawl(vec![fish_bar()], &gate).await.unwrap();

        assert!(report.declined);
        assert_eq!(gate.asked.get(), 1);
        assert!(pipeline.lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn gate_not_asked_when_nothing_pending() {
        let mut cache = MemoryCache::new();
        cache.write(&CachedRecord::from_crawl(&fish_bar(), Vec::new())).unwrap();
        let pipeline = Pipeline::new(FakeLookup::default(), cache, PipelineConfig::default());
        let gate = CountingGate {
            answer: true,
            asked: Cell::new(0),
        };

        let report = pipeline.crawl(vec![fish_bar()], &gate).await.unwrap();

        assert_eq!(report.already_cached, 1);
        assert_eq!(gate.asked.get(), 0);
    }

    #[tokio::test]
    async fn concurrent_crawl_caches_every_record_once() {
        let records: Vec<InputRecord> = (0..8)
            .map(|i| InputRecord::new(format!("g{i}"), "Fish Bar", "1 North Street", "BN1 2AB"))
            .chain(std::iter::once(InputRecord::new("g0", "Fish Bar", "1 North Street", "BN1 2AB")))
            .collect();
        let pipeline = Pipeline::new(
            FakeLookup::default(),
            MemoryCache::new(),
            PipelineConfig { concurrency: 4 },
        );

        let report = pipeline.crawl(records, &AlwaysProceed).await.unwrap();

        assert_eq!(report.crawled, 8);
        assert_eq!(report.duplicates, 1);
        // "Fish Bar" plans 3 names x 2 postcodes per record.
        assert_eq!(pipeline.lookup.calls().len(), 8 * 6);
        assert_eq!(pipeline.into_cache().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn crawl_then_tabulate_from_reopened_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let lookup = FakeLookup::default()
            .respond("Fish Bar", "BN1 2AB", vec![establishment("Fish Bar", "BN1 2AB")])
            .respond("Fish", "BN1", vec![establishment("Fish Bar", "BN1 2AB")]);
        let pipeline = Pipeline::new(
            lookup,
            JsonDirCache::open(tmp.path()).unwrap(),
            PipelineConfig::default(),
        );
        let records = vec![
            fish_bar(),
            InputRecord::new("g2", "Nowhere Cafe", "9 Side Street", "BN9 9ZZ"),
        ];
        let report = pipeline.crawl(records, &AlwaysProceed).await.unwrap();
        assert_eq!(report.crawled, 2);
        assert_eq!(report.empty, 1);
        drop(pipeline);

        let cache = JsonDirCache::open(tmp.path()).unwrap();
        let tabulation = tabulate(&cache, &MatchPolicy::default()).unwrap();

        assert_eq!(tabulation.decisions.len(), 2);
        let matched: Vec<&MatchDecision> = tabulation.matched().collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].record_id, "g1");
        assert_eq!(matched[0].confidence, Some(PostcodeConfidence::Full));
        assert_eq!(tabulation.unmatched().next().unwrap().record_id, "g2");
    }

    #[tokio::test]
    async fn tabulate_skips_malformed_entries() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "not json").unwrap();
        let mut cache = JsonDirCache::open(tmp.path()).unwrap();
        cache.write(&CachedRecord::from_crawl(&fish_bar(), Vec::new())).unwrap();

        let pipeline = Pipeline::new(FakeLookup::default(), cache, PipelineConfig::default());
        let tabulation = pipeline.tabulate(&MatchPolicy::default()).unwrap();

        assert_eq!(tabulation.decisions.len(), 1);
        assert_eq!(tabulation.malformed.len(), 1);
    }
}
