use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::EmbedError;
use crate::models::{Document, ResultOrigin, RetrievalResult};
use tracing::warn;

/// Scores unscored documents against a query with the index's own embedder.
pub struct SimilarityReranker<'a> {
    embedder: &'a dyn Embedder,
}

impl<'a> SimilarityReranker<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder }
    }

    pub fn score(&self, query: &str, document: &Document) -> Result<f32, EmbedError> {
        let query_vector = self.embedder.embed(query)?;
        let document_vector = self.embedder.embed(&document.embedding_text())?;
        Ok(cosine_similarity(&query_vector, &document_vector))
    }

    /// Best first, ranked from 1. A document that cannot be scored gets 0.0.
    pub fn rerank(&self, query: &str, documents: Vec<Document>) -> Vec<RetrievalResult> {
        let mut results = documents
            .into_iter()
            .map(|document| {
                let similarity_score = self.score(query, &document).unwrap_or_else(|error| {
                    warn!(product = %document.product_name, %error, "could not score live document");
                    0.0
                });
                RetrievalResult {
                    document,
                    similarity_score,
                    rank: 0,
                    origin: ResultOrigin::Live,
                }
            })
            .collect::<Vec<_>>();

        results.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
        for (position, result) in results.iter_mut().enumerate() {
            result.rank = position + 1;
        }
        results
    }
}
