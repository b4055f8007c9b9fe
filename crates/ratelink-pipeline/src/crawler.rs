//! Run one record's query plan and gather every distinct establishment.

use ratelink_core::{
    CachedRecord, CandidateSet, InputRecord, Lookup, LookupError, LookupResponse, QueryPlan,
};
use tracing::{debug, warn};

/// Drives query plans through a [`Lookup`].
///
/// The full plan is always exhausted; deciding which candidate matches is
/// left to the matcher.
pub struct Crawler<'a, L: ?Sized> {
    lookup: &'a L,
}

impl<'a, L: Lookup + ?Sized> Crawler<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Crawl `record` and build its cache entry.
    ///
    /// Unparsable responses count as empty and the crawl moves on. A
    /// transport failure aborts the crawl and nothing is returned for caching.
    pub async fn crawl(&self, record: &InputRecord) -> Result<CachedRecord, LookupError> {
        let plan = QueryPlan::new(&record.name, &record.postcode);
        let mut found = CandidateSet::new();

        for query in plan.queries() {
            let response = self.lookup.lookup(query.name, query.postcode).await?;
            let candidates = match response {
                LookupResponse::Establishments(candidates) => candidates,
                LookupResponse::Unparsable(reason) => {
                    warn!(
                        id = %record.id,
                        name = query.name,
                        postcode = query.postcode,
                        %reason,
                        "unparsable lookup response, treating as empty"
                    );
                    continue;
                }
            };

            let added = candidates
                .into_iter()
                .map(|c| found.insert(c))
                .filter(|&inserted| inserted)
                .count();
            debug!(
                id = %record.id,
                name = query.name,
                postcode = query.postcode,
                added,
                "query complete"
            );
        }

        debug!(id = %record.id, queries = plan.len(), candidates = found.len(), "crawl complete");
        Ok(CachedRecord::from_crawl(record, found.into_vec()))
    }
}
