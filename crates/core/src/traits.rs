use crate::error::RegistryError;
use crate::models::{Document, ScoredIndex};

pub trait VectorIndex {
    /// Top `k` hits for an already-normalized query vector, best first.
    /// An index that has not been built returns no hits.
    fn search(&self, query_vector: &[f32], k: usize) -> Vec<ScoredIndex>;

    fn document(&self, corpus_index: usize) -> Option<&Document>;

    fn is_ready(&self) -> bool;
}

/// Query-time registry lookup that assembles fresh, unscored documents.
pub trait LiveSource {
    fn search_live(&self, query: &str) -> Result<Vec<Document>, RegistryError>;
}

impl<T: LiveSource + ?Sized> LiveSource for &T {
    fn search_live(&self, query: &str) -> Result<Vec<Document>, RegistryError> {
        (**self).search_live(query)
    }
}

/// A missing live source finds nothing.
impl<T: LiveSource> LiveSource for Option<T> {
    fn search_live(&self, query: &str) -> Result<Vec<Document>, RegistryError> {
        match self {
            Some(source) => source.search_live(query),
            None => Ok(Vec::new()),
        }
    }
}
