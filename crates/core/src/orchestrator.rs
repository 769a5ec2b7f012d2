use crate::config::RetrievalOptions;
use crate::embeddings::Embedder;
use crate::models::{ResultOrigin, RetrievalResult};
use crate::rerank::SimilarityReranker;
use crate::traits::{LiveSource, VectorIndex};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievalResult>,
    pub vector_count: usize,
    pub live_count: usize,
    pub fallback_triggered: bool,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Vector search first; the live registry fills in when the index is thin or
/// unsure about the query.
pub struct HybridRetriever<'a, I, L> {
    index: &'a I,
    embedder: &'a dyn Embedder,
    live: &'a L,
    options: RetrievalOptions,
}

impl<'a, I, L> HybridRetriever<'a, I, L>
where
    I: VectorIndex,
    L: LiveSource,
{
    pub fn new(index: &'a I, embedder: &'a dyn Embedder, live: &'a L) -> Self {
        Self::with_options(index, embedder, live, RetrievalOptions::default())
    }

    pub fn with_options(
        index: &'a I,
        embedder: &'a dyn Embedder,
        live: &'a L,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            live,
            options,
        }
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub fn retrieve(&self, query: &str) -> RetrievalOutcome {
        let query = query.trim();
        if query.is_empty() {
            return RetrievalOutcome::default();
        }

        let vector_results = self.vector_search(query);
        let vector_count = vector_results.len();

        let needs_fallback = self.needs_fallback(&vector_results);
        let live_results = if needs_fallback {
            info!(
                vector_count,
                threshold = self.options.similarity_threshold,
                "vector results insufficient, searching live registry"
            );
            self.live_search(query)
        } else {
            Vec::new()
        };
        let live_count = live_results.len();

        RetrievalOutcome {
            results: fuse(vector_results, live_results, self.options.max_results),
            vector_count,
            live_count,
            fallback_triggered: needs_fallback,
        }
    }

    fn vector_search(&self, query: &str) -> Vec<RetrievalResult> {
        if !self.index.is_ready() {
            return Vec::new();
        }

        let query_vector = match self.embedder.embed(query) {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%error, "query embedding failed, skipping vector search");
                return Vec::new();
            }
        };

        self.index
            .search(&query_vector, self.options.top_k)
            .into_iter()
            .filter_map(|hit| {
                self.index
                    .document(hit.corpus_index)
                    .map(|document| (hit.score, document.clone()))
            })
            .enumerate()
            .map(|(position, (score, document))| RetrievalResult {
                document,
                similarity_score: score,
                rank: position + 1,
                origin: ResultOrigin::Vector,
            })
            .collect()
    }

    fn needs_fallback(&self, vector_results: &[RetrievalResult]) -> bool {
        let low_similarity = vector_results
            .iter()
            .any(|result| result.similarity_score < self.options.similarity_threshold);
        vector_results.len() < self.options.min_vector_results || low_similarity
    }

    fn live_search(&self, query: &str) -> Vec<RetrievalResult> {
        match self.live.search_live(query) {
            Ok(documents) => SimilarityReranker::new(self.embedder).rerank(query, documents),
            Err(error) => {
                warn!(%error, "live registry search failed");
                Vec::new()
            }
        }
    }
}

/// Vector hits before live hits, then a stable sort by score, so ties keep
/// that order.
pub fn fuse(
    vector_results: Vec<RetrievalResult>,
    live_results: Vec<RetrievalResult>,
    max_results: usize,
) -> Vec<RetrievalResult> {
    let mut fused = vector_results;
    fused.extend(live_results);
    fused.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
    fused.truncate(max_results);

    for (position, result) in fused.iter_mut().enumerate() {
        result.rank = position + 1;
    }
    fused
}
